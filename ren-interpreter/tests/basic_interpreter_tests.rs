use ren_core::UniverseConfig;
use ren_interpreter::universe::Universe;
use rstest::{fixture, rstest};

#[fixture]
pub fn universe() -> Universe {
    Universe::boot(UniverseConfig::default()).expect("could not setup test universe")
}

/// Runs `source` and molds the result, or gives the error's id.
fn eval(universe: &mut Universe, source: &str) -> String {
    match universe.run(source) {
        Ok(value) => universe.mold(&value),
        Err(err) => format!("error: {}", err.id.id_name()),
    }
}

#[rstest]
fn basic_interpreter_tests(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        // evaluation
        ("1 + 2 * 3", "9"),
        ("1 + (2 * 3)", "7"),
        ("x: 10 x", "10"),
        ("'word", "word"),
        ("''word", "'word"),
        ("[a b (c)]", "[a b (c)]"),
        ("1 comment [ignored]", "1"),
        ("2 elide 3", "2"),
        ("7 / 2", "3.5"),
        ("8 / 2", "4"),
        ("remainder 7 3", "1"),
        ("negate 5", "-5"),
        // functions
        ("f: func [x] [return x + 1] f 5", "6"),
        ("g: func [x] [x + 1] g 5", "6"),
        ("h: func [return: <none>] [1 + 1] h", "~void~"),
        ("d: does [1 + 1] d", "2"),
        ("l: lambda [x] [x * 3] l 2", "6"),
        ("x: 1 f: function [] [x: 2 x] f x", "1"),
        ("f: func [x <local> y] [y: x * 2 y] f 4", "8"),
        ("f: func [/twice x] [either twice [x * 2] [0]] f/twice 21", "42"),
        ("f: func [/twice x] [either twice [x * 2] [0]] f", "0"),
        ("f: func ['w] [w] f some-word", "some-word"),
        ("f: func [x] [if x > 0 [return 'positive] 'other] f 1", "positive"),
        ("f: func [x] [if x > 0 [return 'positive] 'other] f -1", "other"),
        ("f: func [return: <elide>] [1] 10 f", "10"),
        // control
        ("if 1 < 2 ['yes]", "yes"),
        ("if 1 > 2 ['yes]", "~null~"),
        ("either 1 > 2 ['a] ['b]", "b"),
        ("all [1 2 3]", "3"),
        ("all [1 false 3]", "~null~"),
        ("any [false 2]", "2"),
        ("x: 0 repeat i 5 [x: x + i] x", "15"),
        ("n: 0 while [n < 5] [n: n + 1] n", "5"),
        ("s: 0 for-each v [1 2 3] [s: s + v] s", "6"),
        ("r: copy [] for-each v [1 2 3 4] [if v = 2 [continue] append r v] r", "[1 3 4]"),
        ("n: 0 loop 10 [n: n + 1 if n = 3 [break]] n", "3"),
        ("catch [loop 10 [throw 42]]", "42"),
        ("catch/name [throw/name 1 'a] 'a", "1"),
        ("catch/name [catch [throw/name 'outer 'b]] 'b", "outer"),
        ("error? trap [1 / 0]", "true"),
        ("trap [1 + 1]", "~null~"),
        ("attempt [1 / 0]", "~null~"),
        ("attempt [1 + 1]", "2"),
        ("do [1 + 1]", "2"),
        ("do \"3 * 3\"", "9"),
        ("reduce [1 + 1 'a]", "[2 a]"),
        // composition
        ("add10: specialize :add [value1: 10] add10 5", "15"),
        ("double: func [x] [x * 2] d: adapt :double [x: x + 1] d 4", "10"),
        ("inner: func [x] [x + 1] outer: enclose :inner func [f] [f/x: f/x * 10 do f] outer 2", "21"),
        ("append-only: :append/only append-only [1] [2]", "[1 [2]]"),
        // contexts
        ("o: make object! [a: 1 b: 2] o/b", "2"),
        ("words-of make object! [a: 1 b: 2]", "[a b]"),
        ("o: make object! [a: 1] extend o 'b 2 o/b", "2"),
        ("o: make object! [x: 1] get in o 'x", "1"),
        ("o: make object! [a: 1 f: func [] [a + 1]] o/f", "2"),
        ("o: make object! [a: 1] o/a: 5 o/a", "5"),
        ("obj: make object! [a: 1] obj2: make obj [a: 2 b: 3] reduce [obj2/a obj2/b obj/a]", "[2 3 1]"),
        ("(make object! [a: 1 b: 2]) == make object! [a: 1 b: 2]", "true"),
        ("(make object! [a: 1 b: 2]) == make object! [b: 2 a: 1]", "false"),
        ("(make object! [a: 1 b: 2]) = make object! [b: 2 a: 1]", "false"),
        ("collect-words/set [a: 1 b c: 2]", "[a c]"),
        ("collect-words/deep [a [b]]", "[a b]"),
        ("t: make object! [a: _ b: 2] resolve/all t make object! [a: 1 c: 3] t/a", "1"),
        ("t: make object! [a: 1] resolve/extend t make object! [c: 3] t/c", "3"),
        // values
        ("quotes-of quote/depth 'a 4", "4"),
        ("unquote/depth quote/depth 1 5 5", "1"),
        ("quote/depth 1 2", "''1"),
        ("type-of first ['''a]", "quoted!"),
        ("kind-of first ['a]", "word!"),
        ("type-of 1", "integer!"),
        ("integer? 1", "true"),
        ("block? 1", "false"),
        ("1 = 1.0", "true"),
        ("1 == 1.0", "false"),
        ("\"abc\" = \"ABC\"", "true"),
        ("\"abc\" == \"ABC\"", "false"),
        ("3 <> 4", "true"),
        ("2 <= 2", "true"),
        ("mold [1 \"a\" b]", "\"[1 ^\"a^\" b]\""),
        ("form 1.5", "\"1.5\""),
        ("to text! 12", "\"12\""),
        ("to integer! \"12\"", "12"),
        ("ensure integer! 1", "1"),
        ("null? if false [1]", "true"),
        // series
        ("append copy \"ab\" \"cd\"", "\"abcd\""),
        ("append [1 2] [3 4]", "[1 2 3 4]"),
        ("length-of [1 2 3]", "3"),
        ("pick [a b c] 2", "b"),
        ("first [a b c]", "a"),
        ("last [a b c]", "c"),
        ("find [1 2 3] 2", "[2 3]"),
        ("find [1 2 3] 4", "~null~"),
        ("index-of next [1 2 3]", "2"),
        ("tail? next [1]", "true"),
    ];

    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn error_tests(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("undefined-word", "error: no-value"),
        ("x: if false [1]", "error: need-non-null"),
        ("1 / 0", "error: zero-divide"),
        ("9223372036854775807 + 1", "error: overflow"),
        ("add 1", "error: no-arg"),
        ("add 1 \"a\"", "error: arg-type"),
        ("append/bogus [] 1", "error: bad-refine"),
        ("f: func [return: [integer!]] [return \"a\"] f", "error: bad-return-type"),
        ("func [a a] []", "error: dup-vars"),
        ("x: 1 protect 'x x: 2", "error: protected-word"),
        ("throw 1", "error: no-catch"),
        ("fail \"custom\"", "error: message"),
        ("1 < \"a\"", "error: invalid-compare"),
        ("f: func [] [g] g: func [] [unwind :h 1] h: func [] [0] f", "error: frame-not-on-stack"),
        ("ensure integer! \"a\"", "error: message"),
    ];

    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[rstest]
fn the_universe_is_usable_after_an_error(mut universe: Universe) {
    assert!(universe.run("1 / 0").is_err());
    assert!(universe.run("collect-words [a: b: a:]").is_ok());
    assert_eq!(universe.run("1 + 1").ok().and_then(|value| value.as_integer()), Some(2));
    assert!(universe.stack.is_empty());
}

#[rstest]
fn trapped_errors_are_objects(mut universe: Universe) {
    let tests: &[(&str, &str)] = &[
        ("e: trap [1 / 0] e/id", "zero-divide"),
        ("e: trap [1 / 0] e/type", "math"),
        ("e: trap [fail \"boom\"] e/message", "\"boom\""),
    ];
    for (source, expected) in tests {
        let result = eval(&mut universe, source);
        assert_eq!(&result, expected, "evaluating `{}`", source);
    }
}

#[test]
fn deep_recursion_is_a_stack_overflow() {
    let config = UniverseConfig { stack_limit: 200, ..UniverseConfig::default() };
    let mut universe = Universe::boot(config).expect("could not setup test universe");
    let result = eval(&mut universe, "f: func [] [f] f");
    assert_eq!(result, "error: stack-overflow");
    assert!(universe.stack.is_empty());
    assert_eq!(eval(&mut universe, "1 + 1"), "2");
}

#[test]
fn deeply_nested_groups_are_a_stack_overflow() {
    let config = UniverseConfig { stack_limit: 100, ..UniverseConfig::default() };
    let mut universe = Universe::boot(config).expect("could not setup test universe");

    let shallow = format!("{}1{}", "(".repeat(90), ")".repeat(90));
    assert_eq!(eval(&mut universe, &shallow), "1");

    let deep = format!("{}1{}", "(".repeat(500), ")".repeat(500));
    assert_eq!(eval(&mut universe, &deep), "error: stack-overflow");
    assert!(universe.stack.is_empty());
    assert_eq!(eval(&mut universe, &shallow), "1");

    // calls and groups count against the same limit
    let mixed = format!("f: func [n] [either n > 0 [({}f n - 1{})] [0]] f 40", "(".repeat(5), ")".repeat(5));
    assert_eq!(eval(&mut universe, &mixed), "error: stack-overflow");
}
