use assert2::{check, let_assert};
use seal::{
    codegen, compile, compile_str,
    config::{CompileOptions, Config},
    error::{CompileError, Diagnostics},
    langspec::LangSpec,
};

fn assemble(source: &str) -> String {
    let_assert!(Ok(root) = compile_str(source, &Config::default()));

    let mut output = Vec::new();
    let_assert!(Ok(()) = codegen::write(&root, &mut output));
    let_assert!(Ok(text) = String::from_utf8(output));
    text
}

const COUNTER: &str = r#"
` Cuenta llamadas a la aplicación `
(@key "counter")

(#in
    (#case (== (txn.ApplicationID) 0)
        (return 1))
    (#case (== (txn.OnCompletion) 0)
        ($count (app_global_get @key))
        (app_global_put @key (+ $count 1))
        (return 1)))

(return 0)
"#;

#[test]
fn counter_application() {
    let expected = "\
#pragma version 8
txn ApplicationID
int 0
==
bz case_0
int 1
return
b in_0
case_0:
txn OnCompletion
int 0
==
bz case_1
byte \"counter\" // @key
app_global_get
store 0 // $count
byte \"counter\" // @key
load 0 // $count
int 1
+
app_global_put
int 1
return
b in_0
case_1:
in_0:
int 0
return
";

    check!(assemble(COUNTER) == expected);
}

#[test]
fn payment_loop() {
    let source = "
        ($i 0)
        (#while (< $i 3)
            (#itxn
                (itxn_field.TypeEnum 1)
                (itxn_field.Receiver (txn.Sender))
                (itxn_field.Amount 1000))
            ($i (+ $i 1)))
        (return 1)
    ";

    let expected = "\
#pragma version 8
int 0
store 0 // $i
while_0:
load 0 // $i
int 3
<
bz while_0_end
itxn_begin
int 1
itxn_field TypeEnum
txn Sender
itxn_field Receiver
int 1000
itxn_field Amount
itxn_submit
load 0 // $i
int 1
+
store 0 // $i
b while_0
while_0_end:
int 1
return
";

    check!(assemble(source) == expected);
}

#[test]
fn subroutines_and_labels() {
    let source = "
        (#fn
            (callsub.double)
            (return 1))
        (double:
            (?proto.1.1)
            (frame_dig.-1)
            (?retsub))
    ";

    let text = assemble(source);
    let lines: Vec<_> = text.lines().collect();
    check!(lines == ["#pragma version 8", "callsub double", "int 1", "return", "double:", "proto 1 1", "frame_dig -1", "retsub"]);
}

#[test]
fn strictness_can_be_disabled() {
    let source = "(return 1 2)";
    check!(compile_str(source, &Config::default()).is_err());

    let lenient = Config::default().with_options(CompileOptions::empty());
    let_assert!(Ok(root) = compile_str(source, &lenient));
    check!(codegen::emit(&root).len() == 4);
}

#[test]
fn errors_carry_positions() {
    let source = "(return\n    (+ 1))";
    let_assert!(Err(error) = compile(source.as_bytes(), "app.seal", &Config::default(), LangSpec::bundled()));

    let_assert!(CompileError::StackArgs { expected: 2, found: 1 } = error.val());
    check!(error.location().to_string() == "app.seal:2:6");
}

#[test]
fn diagnostics_report() {
    let source = "(return\n    (frobnicate 1))";
    let_assert!(Err(error) = compile(source.as_bytes(), "app.seal", &Config::default(), LangSpec::bundled()));

    let report = Diagnostics::from(error).kind("Compiler error").to_string();
    let lines: Vec<_> = report.lines().collect();

    check!(lines[0] == "Compiler error: Invalid opcode `frobnicate`");
    check!(lines[1] == " --> app.seal:[2:6-2:15]");
    check!(lines[3] == "2 |     (frobnicate 1))");
    check!(lines[4] == "  |      ^^^^^^^^^^");
}

#[test]
fn no_state_leaks_between_compilations() {
    let source = "($x 1) (@c 2) (#case $x (pop @c))";
    check!(assemble(source) == assemble(source));
}

#[test]
fn alternate_table() {
    let table = r#"{
        "Version": 1,
        "Ops": [
            {"Name": "push", "Size": 2, "Returns": ["uint64"], "ImmediateDetails": [{"Name": "n", "Encoding": "varuint"}]},
            {"Name": "int", "Size": 2, "Returns": ["uint64"], "ImmediateDetails": [{"Name": "n", "Encoding": "varuint"}]},
            {"Name": "halt", "Size": 1, "Args": ["uint64", "uint64"]}
        ]
    }"#;

    let_assert!(Ok(spec) = LangSpec::from_reader(table.as_bytes()));
    let_assert!(Ok(root) = compile("(halt push.1 2)".as_bytes(), "<alt>", &Config::default(), &spec));

    let lines: Vec<_> = codegen::emit(&root).iter().map(ToString::to_string).collect();
    check!(lines == ["#pragma version 8", "push 1", "int 2", "halt"]);

    let_assert!(Err(error) = compile("(halt \"x\")".as_bytes(), "<alt>", &Config::default(), &spec));
    let_assert!(CompileError::InvalidOpcode(name) = error.val());
    check!(name.as_ref() == "byte");
}
