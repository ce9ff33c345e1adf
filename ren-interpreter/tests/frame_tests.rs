use ren_core::UniverseConfig;
use ren_interpreter::universe::Universe;
use ren_interpreter::value::Cell;
use ren_interpreter::vm_objects::context::{Context, ContextFlags};
use ren_interpreter::vm_objects::frame::{Frame, FrameState};
use ren_value::Kind;
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
fn definitional_return(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        // each recursion level returns to its own frame
        ("f: func [n] [if n > 0 [f n - 1] return n] f 3", "3"),
        ("fact: func [n] [if n < 2 [return 1] n * fact n - 1] fact 5", "120"),
        // return out of a loop and a nested block
        ("f: func [] [loop 5 [either true [return 'early] [0]] 'late] f", "early"),
        // a RETURN passed down into another function still goes to its own frame
        ("g: func [ret] [ret 1 'from-g] f: func [] [g :return 'from-f] f", "1"),
        // a RETURN whose frame has finished has nowhere to go
        ("mk: func [] [:return] r: mk r 1", "error: frame-not-on-stack"),
        ("f: func [return: [integer!]] [return 1] f", "1"),
        ("f: func [return: [integer!]] [\"a\"] f", "error: bad-return-type"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn lambdas_return_to_the_enclosing_function(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("f: func [] [l: lambda [x] [return x * 2] l 5 'not-reached] f", "10"),
        ("f: func [] [l: lambda [] [loop 3 [return 'out]] l 'not-reached] f", "out"),
        ("l: lambda [x] [x * 3] l 2", "6"),
        ("l: lambda [] [] l", "~void~"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }

    let value = universe.run("lambda [x] [x]").expect("making the lambda failed");
    let lambda = value.as_action().cloned().expect("lambda did not make an action");
    assert_eq!(lambda.return_slot(), None);
    assert_eq!(lambda.num_params(), 1);
}

#[rstest]
fn arguments_are_gathered_left_to_right(mut universe: Universe) {
    let result = eval(
        &mut universe,
        "log: copy [] f: func [a b /ref c] [reduce [a b c]] f/ref (append log 'a 1) (append log 'b 2) (append log 'c 3) log",
    );
    assert_eq!(result, "[a b c]");

    let result = eval(&mut universe, "f: func [a /x b /y c] [reduce [a b c]] f/y/x 1 2 3");
    assert_eq!(result, "[1 3 2]");
}

#[rstest]
fn unwind(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("f: func [] [g 10 'not-reached] g: func [n] [unwind :f n * 2] f", "20"),
        ("f: func [] [g] g: func [] [unwind 1 'early 'late] f", "early"),
        ("f: function [] [h: binding-of 'h g h 'not-reached] g: func [frame] [unwind frame 'via-frame] f", "via-frame"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn first_class_frames(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("f: make frame! :add f/value1: 1 f/value2: 2 do f", "3"),
        ("f: make frame! :subtract f/value1: 10 f/value2: 4 do f", "6"),
        ("f: make frame! :add f/value1: 1 f/value2: 2 do f do f", "error: frame-already-used"),
        ("f: make frame! :add f/value1: 1 do f", "error: arg-type"),
        ("g: func [x] [x * 2] f: make frame! :g f/x: 21 do f", "42"),
        ("make frame! 1", "error: bad-make-arg"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn composed_actions(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("f: func [x] [x + 1] g: augment :f [y] g 1 2", "2"),
        ("f: func [x] [x + 1] g: augment :f [/extra] g/extra 1", "2"),
        ("add10: specialize :add [value1: 10] add20: specialize :add10 [value2: 10] add20", "20"),
        ("add1: specialize :add [value2: 1] add1 41", "42"),
        ("half: adapt :divide [value2: 2] half 9 100", "4.5"),
        ("trace-log: copy [] t: enclose :negate func [f] [append trace-log 'in do f] reduce [t 3 trace-log]", "[-3 [in]]"),
        ("plus: enfix func [a b] [a + b] 1 plus 2", "3"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn calling_actions_from_rust(mut universe: Universe) {
    let sum = universe.call("add", vec![Cell::integer(40), Cell::integer(2)]).expect("add failed");
    assert_eq!(sum.as_integer(), Some(42));

    universe.run("square: func [n] [n * n]").expect("defining square failed");
    let square = universe.call("square", vec![Cell::integer(7)]).expect("square failed");
    assert_eq!(square.as_integer(), Some(49));

    let err = universe.call("add", vec![Cell::integer(1)]).expect_err("add takes two arguments");
    assert_eq!(err.id.id_name(), "arg-type");

    let err = universe.call("no-such-function", Vec::new()).expect_err("nothing to call");
    assert_eq!(err.id.id_name(), "no-value");
    assert!(universe.stack.is_empty());
}

#[rstest]
fn errors_name_the_failing_call(mut universe: Universe) {
    let err = universe.run("f: func [x] [x / 0] f 1").expect_err("division by zero");
    assert_eq!(err.id.id_name(), "zero-divide");
    assert!(err.where_.iter().any(|label| label == "f"), "where: {:?}", err.where_);
    assert!(err.to_string().starts_with("** Math Error"), "{}", err);
}

#[rstest]
fn popped_frames_are_done(mut universe: Universe) {
    let value = universe.run("func [x] [x]").expect("making the function failed");
    let action = value.as_action().cloned().expect("func did not make an action");
    let vars = vec![Cell::integer(1); action.num_params()];
    let varlist = Context::alloc_with(&mut universe.gc_interface, Kind::Frame, action.keylist(), vars);
    let mut frame = Frame::new(varlist, action, None, None);
    assert_eq!(frame.state, FrameState::InitialEntry);

    universe.push_frame(&frame);
    assert!(frame.varlist.has_flag(ContextFlags::LIVE));
    assert_eq!(universe.stack.last().map(|entry| entry.state), Some(FrameState::InitialEntry));

    universe.pop_frame(&mut frame);
    assert_eq!(frame.state, FrameState::Done);
    assert!(!frame.varlist.has_flag(ContextFlags::LIVE));
    assert!(universe.stack.is_empty());
}
