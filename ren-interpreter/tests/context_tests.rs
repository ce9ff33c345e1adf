use ren_core::UniverseConfig;
use ren_interpreter::universe::Universe;
use ren_interpreter::vm_objects::context::Context;
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

fn object(universe: &Universe, name: &str) -> Context {
    universe
        .lookup(name)
        .and_then(|value| value.as_context().cloned())
        .unwrap_or_else(|| panic!("`{}` is not an object", name))
}

#[rstest]
fn derived_objects_get_their_own_keylist(mut universe: Universe) {
    let result = eval(&mut universe, "obj: make object! [a: 1] obj2: make obj [a: 2 b: 3] reduce [obj2/a obj2/b obj/a]");
    assert_eq!(result, "[2 3 1]");

    let obj = object(&universe, "obj");
    let obj2 = object(&universe, "obj2");
    assert!(!obj.shares_keylist(&obj2));
    assert_ne!(obj.keylist().id(), obj2.keylist().id());
    assert!(obj2.keylist().derives_from(&obj.keylist()));
    assert_eq!(obj.len(), 1);
    assert_eq!(obj2.len(), 2);
}

#[rstest]
fn derived_objects_without_new_keys_share_the_keylist(mut universe: Universe) {
    universe.run("base: make object! [a: 1 b: 2] same-keys: make base [a: 10]").expect("making objects failed");
    let base = object(&universe, "base");
    let derived = object(&universe, "same-keys");
    assert!(base.shares_keylist(&derived));
    let keylist_id = base.keylist().id();

    universe.run("extend same-keys 'c 3").expect("extend failed");
    assert!(!base.shares_keylist(&derived));
    assert_eq!(base.keylist().id(), keylist_id);
    assert_eq!(eval(&mut universe, "words-of base"), "[a b]");
    assert_eq!(eval(&mut universe, "words-of same-keys"), "[a b c]");
    assert_eq!(eval(&mut universe, "in base 'c"), "~null~");
}

#[rstest]
fn appends_never_move_existing_keys(mut universe: Universe) {
    universe.run("o: make object! [a: 1 b: 2]").expect("making the object failed");
    let o = object(&universe, "o");
    let a = universe.interner.intern("a");
    let b = universe.interner.intern("b");
    let (index_a, index_b) = (o.find(a, false), o.find(b, false));

    universe.run("extend o 'c 3 extend o 'd 4 extend o 'a 5").expect("extend failed");
    assert_eq!(o.find(a, false), index_a);
    assert_eq!(o.find(b, false), index_b);
    assert_eq!(o.len(), 4);
    assert_eq!(eval(&mut universe, "reduce [o/a o/b o/c o/d]"), "[5 2 3 4]");
}

#[rstest]
fn context_operations(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("values-of make object! [a: 1 b: \"x\"]", "[1 \"x\"]"),
        ("o: make object! [x: 10] b: bind [x + 1] o do b", "11"),
        ("o: make object! [x: 10] w: bind 'x o get w", "10"),
        ("o: make object! [a: 1] set in o 'a 5 o/a", "5"),
        ("o: make object! [b: [1]] o2: copy o append o2/b 2 o/b", "[1 2]"),
        ("o: make object! [b: [1]] o2: copy/deep o append o2/b 2 o/b", "[1]"),
        ("collect-words/ignore [a b c] [b]", "[a c]"),
        ("collect-words [a b a]", "[a b]"),
        ("t: make object! [a: 1 b: 2] resolve t make object! [a: 10 b: 20] reduce [t/a t/b]", "[1 2]"),
        ("t: make object! [a: 1 b: 2] resolve/only/all t make object! [a: 10 b: 20] [b] reduce [t/a t/b]", "[1 20]"),
        ("e: make error! \"bad thing\" e/message", "\"bad thing\""),
        ("(make object! [a: 1]) = make object! [a: 1]", "true"),
        ("o: make object! [a: 1] same? o o", "true"),
        ("(make object! [a: 1]) == make object! [a: 2]", "false"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn protection(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("o: make object! [a: 1] protect o o/a: 2", "error: protected-word"),
        ("o: make object! [a: 1] protect o unprotect o o/a: 2 o/a", "2"),
        ("o: make object! [a: 1 b: 2] protect in o 'a o/b: 3 o/b", "3"),
        ("o: make object! [a: 1 b: 2] protect/hide in o 'b words-of o", "[a]"),
        ("o: make object! [a: 1 b: 2] protect/hide in o 'b in o 'b", "~null~"),
        ("x: 1 protect 'x set 'x 2", "error: protected-word"),
        ("o: make object! [a: 1 b: 2] protect/hide in o 'b make o [b: 3]", "error: protected-word"),
        ("o: make object! [a: 1 b: 2] protect/hide in o 'b o2: make o [c: 3] words-of o2", "[a c]"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn deriving_keeps_hidden_keys_single(mut universe: Universe) {
    let result = eval(&mut universe, "o: make object! [a: 1 b: 2] protect/hide in o 'b o2: make o [a: 5 c: 3] o2/a");
    assert_eq!(result, "5");
    let o2 = object(&universe, "o2");
    assert_eq!(o2.len(), 3);
    assert_eq!(o2.keylist().keys().iter().filter(|key| universe.interner.reverse_lookup(key.symbol) == "b").count(), 1);
}

#[rstest]
fn derived_objects_get_methods_over_their_own_fields(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("o: make object! [a: 1 f: func [] [a]] o2: make o [a: 2] reduce [o/f o2/f]", "[1 2]"),
        ("o: make object! [a: 1 f: func [] [a: a + 1]] o2: make o [] o2/f o2/f reduce [o/a o2/a]", "[1 3]"),
        ("o: make object! [n: 1 g: lambda [x] [x * n]] o2: make o [n: 10] reduce [o/g 2 o2/g 2]", "[2 20]"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }

    let o = object(&universe, "o");
    let o2 = object(&universe, "o2");
    let method = |context: &Context| context.var(2).and_then(|var| var.as_action().cloned());
    let (Some(original), Some(derived)) = (method(&o), method(&o2)) else {
        panic!("`g` is not a function");
    };
    assert!(!original.ptr_eq(&derived));
}

#[rstest]
fn objects_mold_as_make_object(mut universe: Universe) {
    let value = universe.run("make object! [a: 1 b: \"x\" c: 'w]").expect("making the object failed");
    assert_eq!(universe.mold(&value), "make object! [\n    a: 1\n    b: \"x\"\n    c: 'w\n]");
}

#[rstest]
fn failed_collects_leave_the_binder_clean(mut universe: Universe) {
    assert_eq!(eval(&mut universe, "func [a b a] []"), "error: dup-vars");
    assert_eq!(eval(&mut universe, "collect-words/set [x: y: z:]"), "[x y z]");
    assert_eq!(eval(&mut universe, "f: func [a b] [a + b] f 1 2"), "3");
}

#[rstest]
fn words_inside_functions_see_the_running_frame(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        // a block made by a call still sees that call's variables afterwards
        ("mk: func [x] [[x]] b: mk 42 do b", "42"),
        ("mk: func [x] [[x]] b1: mk 1 b2: mk 2 reduce [do b1 do b2]", "[1 2]"),
        ("f: function [] [local: 7 fr: binding-of 'local fr/local] f", "7"),
        ("counter: func [n] [func [] [n: n + 1]] c: counter 10 c c", "12"),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}
