use std::rc::Rc;
use std::sync::atomic::Ordering;

use ren_core::{BootPhase, UniverseConfig};
use ren_interpreter::error::{ErrorId, RenError};
use ren_interpreter::hooks::TypeHooks;
use ren_interpreter::invokable::Return;
use ren_interpreter::universe::Universe;
use ren_interpreter::value::{Cell, TypeKey};
use ren_interpreter::vm_objects::frame::Frame;
use rstest::{fixture, rstest};

#[fixture]
pub fn universe() -> Universe {
    Universe::boot(UniverseConfig::default()).expect("could not setup test universe")
}

fn eval(universe: &mut Universe, source: &str) -> String {
    match universe.run(source) {
        Ok(value) => universe.mold(&value),
        Err(err) => format!("error: {}", err.id.id_name()),
    }
}

#[rstest]
fn boot_runs_to_completion(mut universe: Universe) {
    assert_eq!(universe.phase(), BootPhase::Done);
    assert!(universe.stack.is_empty());
    assert_eq!(eval(&mut universe, "system/version"), "0.1.0");
    assert_eq!(eval(&mut universe, "system/product"), "ren");
    assert_eq!(eval(&mut universe, "system/options/script"), "_");
    assert_eq!(eval(&mut universe, "system/options/args"), "[]");
}

#[test]
fn boot_phases_are_ordered() {
    let mut phase = BootPhase::Start;
    let mut seen = vec![phase];
    while let Some(next) = phase.next() {
        assert!(next > phase);
        seen.push(next);
        phase = next;
    }
    assert_eq!(seen, BootPhase::ALL);
    assert_eq!(phase, BootPhase::Done);
}

#[test]
fn script_arguments_show_up_in_system_options() {
    let config = UniverseConfig {
        script: Some("demo.reb".into()),
        args: vec!["one".to_string(), "two".to_string()],
        ..UniverseConfig::default()
    };
    let mut universe = Universe::boot(config).expect("could not setup test universe");
    assert_eq!(eval(&mut universe, "system/options/args"), "[\"one\" \"two\"]");
    assert_eq!(eval(&mut universe, "system/options/script"), "\"demo.reb\"");
    assert_eq!(eval(&mut universe, "length-of system/options/args"), "2");
}

#[test]
fn bad_configurations_refuse_to_boot() {
    let config = UniverseConfig { stack_limit: 1, ..UniverseConfig::default() };
    assert!(Universe::boot(config).is_err());
}

#[test]
fn shutdown_releases_every_series() {
    let universe = Universe::boot(UniverseConfig::default()).expect("could not setup test universe");
    assert_eq!(universe.shutdown(), 0);

    let mut universe = Universe::boot(UniverseConfig::default()).expect("could not setup test universe");
    let source = "
        obj: make object! [a: 1 f: func [] [a + 1]]
        obj2: make obj [b: obj]
        mk: func [x] [[x]]
        kept: mk 10
        e: trap [1 / 0]
        fr: make frame! :add
    ";
    universe.run(source).expect("setup script failed");
    assert!(universe.run("fail \"on purpose\"").is_err());
    assert_eq!(universe.shutdown(), 0);
}

#[test]
fn universes_boot_and_shut_down_repeatedly() {
    for round in 0..3 {
        let mut universe = Universe::boot(UniverseConfig::default()).expect("could not setup test universe");
        let value = universe.run(&format!("{} * 2", round)).expect("evaluation failed");
        assert_eq!(value.as_integer(), Some(round * 2));
        assert_eq!(universe.shutdown(), 0, "round {}", round);
    }
}

fn triple(_: &mut Universe, frame: &mut Frame) -> Result<Return, RenError> {
    let value: i64 = frame.get(1)?;
    let tripled = value.checked_mul(3).ok_or(ErrorId::Overflow)?;
    Ok(Return::Local(Cell::integer(tripled)))
}

#[rstest]
fn natives_can_be_registered_from_rust(mut universe: Universe) {
    universe.register_native("triple", "value [integer!]", triple).expect("registering triple failed");
    assert_eq!(eval(&mut universe, "triple 14"), "42");
    assert_eq!(eval(&mut universe, "1 + triple 2"), "7");
    assert_eq!(eval(&mut universe, "triple \"a\""), "error: arg-type");
    assert_eq!(eval(&mut universe, "triple 4611686018427387904"), "error: overflow");
    assert_eq!(eval(&mut universe, "t3: specialize :triple [value: 3] t3"), "9");

    let result = universe.call("triple", vec![Cell::integer(5)]).expect("calling triple failed");
    assert_eq!(result.as_integer(), Some(15));
}

fn make_point(_: &mut Universe, datatype: &Cell, spec: &Cell) -> Return {
    let Some(TypeKey::Custom(type_id)) = datatype.as_datatype() else {
        return ErrorId::BadMake("point! from a prototype".to_string()).into();
    };
    let Some((array, index, _)) = spec.as_array() else {
        return ErrorId::BadMake(format!("point! from {}", spec.type_of())).into();
    };
    let coords: Vec<i64> = array.to_vec_from(index).iter().filter_map(Cell::as_integer).collect();
    if coords.len() != 2 {
        return ErrorId::BadMake("point! from anything but two integers".to_string()).into();
    }
    Return::Local(Cell::custom(type_id, Rc::new(coords)))
}

fn pick_point(universe: &mut Universe, point: &Cell, picker: &Cell) -> Result<Cell, ErrorId> {
    let coords = point.as_custom().and_then(|(_, data)| (**data).downcast_ref::<Vec<i64>>());
    let Some(coords) = coords else {
        return Err(ErrorId::Internal("point! without coordinates".to_string()));
    };
    match universe.spelling_of(picker).as_str() {
        "x" => Ok(Cell::integer(coords[0])),
        "y" => Ok(Cell::integer(coords[1])),
        _ => Err(ErrorId::BadPath(universe.mold(picker))),
    }
}

#[rstest]
fn custom_types_dispatch_through_their_hooks(mut universe: Universe) {
    let hooks = TypeHooks { make: Some(make_point), pick: Some(pick_point), ..TypeHooks::default() };
    universe.register_type("point", hooks).expect("registering point! failed");

    let tests: &[(&str, &str)] = &[
        ("p: make point! [3 4] p/x", "3"),
        ("p: make point! [3 4] p/y", "4"),
        ("p: make point! [3 4] type-of p", "point!"),
        ("p: make point! [3 4] p", "#[point!]"),
        ("p: make point! [3 4] p/z", "error: bad-path-pick"),
        ("make point! [1]", "error: bad-make-arg"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn halting_stops_the_evaluation(mut universe: Universe) {
    let halt = universe.halt_handle();
    halt.store(true, Ordering::Relaxed);
    let err = universe.run("loop 1000000 [1 + 1]").expect_err("the halt request was ignored");
    assert!(err.is_halt());
    assert!(universe.stack.is_empty());
    assert_eq!(eval(&mut universe, "1 + 1"), "2");

    assert_eq!(eval(&mut universe, "trap [halt]"), "error: halted");
    assert_eq!(eval(&mut universe, "catch [halt]"), "error: halted");
    assert_eq!(eval(&mut universe, "attempt [halt]"), "error: halted");
}
