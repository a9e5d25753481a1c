use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

fn run(source: &str) -> Output {
    let mut file = NamedTempFile::with_suffix(".lox").expect("create temp script");
    file.write_all(source.as_bytes()).expect("write script");

    Command::new(env!("CARGO_BIN_EXE_lox"))
        .arg(file.path())
        .output()
        .expect("spawn lox")
}

fn stdout(source: &str) -> String {
    let output = run(source);
    assert!(
        output.status.success(),
        "expected success, got {:?}\nstderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("utf8 stdout")
}

#[test]
fn closure_counter_keeps_its_own_state() {
    let out = stdout(
        r#"
        fun makeCounter() {
          var i = 0;
          fun count() {
            i = i + 1;
            print i;
          }
          return count;
        }

        var counter = makeCounter();
        counter();
        counter();
        counter();
        "#,
    );
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn resolver_binds_each_closure_to_the_scope_it_closed_over() {
    // The canonical lexical-scoping check: `showA` must keep printing the
    // global `a` it closed over, even after the block reassigns the name.
    let out = stdout(
        r#"
        var a = "global";
        {
          fun showA() {
            print a;
          }

          showA();
          var a = "block";
          showA();
        }
        "#,
    );
    assert_eq!(out, "global\nglobal\n");
}

#[test]
fn single_inheritance_dispatches_through_super() {
    let out = stdout(
        r#"
        class Doughnut {
          cook() {
            print "Fry until golden brown.";
          }
        }

        class BostonCream < Doughnut {
          cook() {
            super.cook();
            print "Pipe full of custard and coat with chocolate.";
          }
        }

        BostonCream().cook();
        "#,
    );
    assert_eq!(
        out,
        "Fry until golden brown.\nPipe full of custard and coat with chocolate.\n"
    );
}

#[test]
fn initializer_can_return_early_but_still_yields_the_instance() {
    let out = stdout(
        r#"
        class Thing {
          init(value) {
            this.value = value;
            if (value < 0) return;
            this.value = value * 2;
          }
        }

        print Thing(5).value;
        print Thing(-1).value;
        "#,
    );
    assert_eq!(out, "10\n-1\n");
}

#[test]
fn a_runtime_error_inside_init_propagates_instead_of_yielding_the_instance() {
    let output = run(
        r#"
        class Foo {
          init() {
            this.x = 1 / 0;
          }
        }

        Foo();
        "#,
    );
    assert_eq!(output.status.code(), Some(70));
    assert!(String::from_utf8_lossy(&output.stderr).contains("must not be zero"));
}

#[test]
fn return_at_top_level_is_a_static_error_with_exit_code_65() {
    let output = run("return 1;");
    assert_eq!(output.status.code(), Some(65));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Can't return from top-level code."));
}

#[test]
fn for_loop_desugars_to_a_while_loop_with_its_own_scope() {
    let out = stdout(
        r#"
        for (var i = 0; i < 3; i = i + 1) {
          print i;
        }
        "#,
    );
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn break_exits_only_the_nearest_enclosing_loop() {
    let out = stdout(
        r#"
        for (var i = 0; i < 5; i = i + 1) {
          if (i == 3) break;
          print i;
        }
        "#,
    );
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn division_by_zero_or_negative_zero_is_a_runtime_error_with_exit_code_70() {
    for source in ["print 1 / 0;", "print 1 / -0.0;"] {
        let output = run(source);
        assert_eq!(output.status.code(), Some(70), "source: {source}");
        assert!(String::from_utf8_lossy(&output.stderr).contains("must not be zero"));
    }
}

#[test]
fn plus_concatenates_a_string_with_a_stringified_number_either_side() {
    let out = stdout(
        r#"
        print "a" + 1;
        print 1 + "a";
        "#,
    );
    assert_eq!(out, "a1\n1a\n");
}

#[test]
fn an_uninitialized_var_is_nil() {
    let out = stdout("var a; print a;");
    assert_eq!(out, "nil\n");
}

#[test]
fn exactly_255_arguments_is_accepted_and_runs() {
    let params: Vec<String> = (0..255).map(|i| format!("a{i}")).collect();
    let args: Vec<String> = (0..255).map(|i| i.to_string()).collect();
    let source = format!(
        "fun sum({}) {{ return a0 + a254; }}\nprint sum({});",
        params.join(", "),
        args.join(", ")
    );
    let out = stdout(&source);
    assert_eq!(out, "254\n");
}
