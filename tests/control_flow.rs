use kolak::error::CompilerError;
use kolak::test_utils::{compile_and_run, have_toolchain};

type TestResult = Result<(), CompilerError>;

#[test]
fn test_if_taken_branch() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int x = 4;
            if (x > 3) return 1;
            else return 2;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_if_taken_branch")?, 1);
    Ok(())
}

#[test]
fn test_if_fallthrough_to_else() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int x = 2;
            if (x > 3) return 1;
            return 2;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_if_fallthrough_to_else")?, 2);
    Ok(())
}

#[test]
fn test_while_sum() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int i = 0, sum = 0;
            while (i < 10) {
                i++;
                sum += i;
            }
            return sum;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_while_sum")?, 55);
    Ok(())
}

#[test]
fn test_for_loop_fibonacci() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int a = 0, b = 1, c;
            for (int i = 2; i <= 11; i++) {
                c = a + b;
                a = b;
                b = c;
            }
            return b;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_for_loop_fibonacci")?, 89);
    Ok(())
}

#[test]
fn test_do_while_runs_body_first() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int n = 0;
            do n++; while (n < 0);
            return n;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_do_while_runs_body_first")?, 1);
    Ok(())
}

#[test]
fn test_break_exits_innermost_loop() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int total = 0;
            for (int i = 0; i < 5; i++) {
                for (int j = 0; j < 5; j++) {
                    if (j == 2) break;
                    total++;
                }
            }
            return total;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_break_exits_innermost_loop")?, 10);
    Ok(())
}

#[test]
fn test_continue_reaches_step_clause() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int total = 0;
            for (int i = 0; i < 10; i++) {
                if (i % 2) continue;
                total += i;
            }
            return total;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_continue_reaches_step_clause")?, 20);
    Ok(())
}

#[test]
fn test_continue_in_while_rechecks_condition() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int i = 0, hits = 0;
            while (i < 6) {
                i++;
                if (i == 3) continue;
                hits++;
            }
            return hits;
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_continue_in_while_rechecks_condition")?,
        5
    );
    Ok(())
}

#[test]
fn test_bare_for_with_break() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int n = 0;
            for (;;) {
                n++;
                if (n == 7) break;
            }
            return n;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_bare_for_with_break")?, 7);
    Ok(())
}

#[test]
fn test_goto_forward() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int x = 1;
            goto done;
            x = 5;
        done:
            return x;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_goto_forward")?, 1);
    Ok(())
}

#[test]
fn test_goto_backward_builds_a_loop() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int main() {
            int i = 0;
        again:
            i++;
            if (i < 4) goto again;
            return i;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_goto_backward_builds_a_loop")?, 4);
    Ok(())
}

#[test]
fn test_short_circuit_skips_side_effects() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int bump(int *p) {
            *p = *p + 1;
            return 1;
        }

        int main() {
            int calls = 0;
            int a = 0 && bump(&calls);
            int b = 1 || bump(&calls);
            return calls * 100 + a * 10 + b;
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_short_circuit_skips_side_effects")?,
        1
    );
    Ok(())
}

#[test]
fn test_nested_if_else_chain() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int grade(int score) {
            if (score >= 90) return 4;
            else if (score >= 80) return 3;
            else if (score >= 70) return 2;
            else return 0;
        }

        int main() {
            return grade(95) * 16 + grade(85) * 4 + grade(60);
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_nested_if_else_chain")?, 76);
    Ok(())
}
