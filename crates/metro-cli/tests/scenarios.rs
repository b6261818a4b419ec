//! End-to-end scenarios from spec.md 8, driven through the `metro` binary
//! via `-c <expr>`.

use assert_cmd::Command;
use predicates::prelude::*;

fn metro() -> Command {
    Command::cargo_bin("metro").expect("binary built")
}

#[test]
fn s1_hello_prints_and_exits_zero() {
    metro()
        .args(["-c", "fn main() -> Int { println(\"hello\"); 0 } main();"])
        .assert()
        .success()
        .stdout(predicate::eq("hello\n"));
}

#[test]
fn s2_arithmetic() {
    metro().args(["-c", "let x: Int = (1 + 2) * 3 - 4; println(to_string(x));"]).assert().success().stdout(predicate::eq("5\n"));
}

#[test]
fn s3_for_range_accumulates() {
    metro()
        .args(["-c", "let s = 0; for i in 0..5 { s = s + i; } println(to_string(s));"])
        .assert()
        .success()
        .stdout(predicate::eq("10\n"));
}

#[test]
fn s4_dict_insert_and_order() {
    metro()
        .args(["-c", "let d = dict<String, Int>{\"a\": 1, \"b\": 2}; d[\"c\"] = 3; println(to_string(d));"])
        .assert()
        .success()
        .stdout(predicate::eq("{a: 1, b: 2, c: 3}\n"));
}

#[test]
fn s5_struct_impl_method() {
    metro()
        .args(["-c", "struct P { x: Int, y: Int } impl P { fn sum(self) -> Int { self.x + self.y } } let p = new P(x: 3, y: 4); println(to_string(p.sum()));"])
        .assert()
        .success()
        .stdout(predicate::eq("7\n"));
}

#[test]
fn s6_enum_switch_match() {
    metro()
        .args([
            "-c",
            "enum E { A, B(Int) } let v = E.B(9); switch v { case E.A: println(\"a\"); case E.B(_): println(\"b\"); }",
        ])
        .assert()
        .success()
        .stdout(predicate::eq("b\n"));
}

#[test]
fn s7_recursive_struct_is_diagnosed() {
    metro().args(["-c", "struct N { n: N }"]).assert().failure().code(1);
}

#[test]
fn s8_division_by_zero_is_a_runtime_error() {
    metro().args(["-c", "let x = 1 / 0;"]).assert().failure().code(2);
}
