//! Calling-convention coverage: register assignment for both operand
//! classes, stack spill, variadic calls, and return-value normalization.

use kolak::error::CompilerError;
use kolak::test_utils::{compile_and_run, compile_and_run_with_output, have_toolchain};

type TestResult = Result<(), CompilerError>;

#[test]
fn test_six_integer_args_in_registers() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int sum6(int a, int b, int c, int d, int e, int f) {
            return a * 1 + b * 2 + c * 3 + d * 4 + e * 5 + f * 6;
        }

        int main() {
            return sum6(6, 5, 4, 3, 2, 1);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_six_integer_args_in_registers")?,
        56
    );
    Ok(())
}

#[test]
fn test_eight_integer_args_spill_to_stack() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int sum8(int a, int b, int c, int d, int e, int f, int g, int h) {
            return a * 1 + b * 2 + c * 3 + d * 4 + e * 5 + f * 6 + g * 7 + h * 8;
        }

        int main() {
            return sum8(1, 2, 3, 4, 5, 6, 7, 8);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_eight_integer_args_spill_to_stack")?,
        204
    );
    Ok(())
}

#[test]
fn test_int_and_float_registers_are_independent() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        double mix(int a, double x, int b, double y) {
            return a + x * 2.0 + b * 3 + y * 4.0;
        }

        int main() {
            return (int)mix(1, 2.0, 3, 4.0);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_int_and_float_registers_are_independent")?,
        30
    );
    Ok(())
}

#[test]
fn test_ninth_float_arg_goes_to_stack() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        double sum9(double a, double b, double c, double d, double e,
                    double f, double g, double h, double i) {
            return a + b + c + d + e + f + g + h + i * 10.0;
        }

        int main() {
            return (int)sum9(1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_ninth_float_arg_goes_to_stack")?,
        28
    );
    Ok(())
}

#[test]
fn test_two_register_struct_falls_back_to_stack() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    // Five integer args leave one free register; a 16-byte record needs
    // two, so the whole record travels on the stack.
    let c_code = r#"
        struct quad {
            long a;
            long b;
        };

        long take(long r1, long r2, long r3, long r4, long r5, struct quad q) {
            return r1 + q.a * 2 + q.b * 3;
        }

        int main() {
            struct quad q;
            q.a = 4;
            q.b = 5;
            return (int)take(1, 0, 0, 0, 0, q);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_two_register_struct_falls_back_to_stack")?,
        24
    );
    Ok(())
}

#[test]
fn test_variadic_printf() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int printf(char *fmt, ...);

        int main() {
            printf("%d-%d", 7, 42);
            return 0;
        }
    "#;
    let output = compile_and_run_with_output(c_code, "test_variadic_printf")?;
    assert_eq!(output, "7-42");
    Ok(())
}

#[test]
fn test_variadic_printf_with_float() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int printf(char *fmt, ...);

        int main() {
            printf("%.1f %d", 2.5, 3);
            return 0;
        }
    "#;
    let output = compile_and_run_with_output(c_code, "test_variadic_printf_with_float")?;
    assert_eq!(output, "2.5 3");
    Ok(())
}

#[test]
fn test_recursive_factorial() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int fact(int n) {
            if (n < 2) return 1;
            return n * fact(n - 1);
        }

        int main() {
            return fact(5);
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_recursive_factorial")?, 120);
    Ok(())
}

#[test]
fn test_mutual_recursion_through_forward_declaration() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int is_odd(int n);

        int is_even(int n) {
            if (n == 0) return 1;
            return is_odd(n - 1);
        }

        int is_odd(int n) {
            if (n == 0) return 0;
            return is_even(n - 1);
        }

        int main() {
            return is_even(10) * 10 + is_odd(7);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_mutual_recursion_through_forward_declaration")?,
        11
    );
    Ok(())
}

#[test]
fn test_narrow_return_is_truncated_by_callee() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        char low(int x) {
            return x;
        }

        int main() {
            return low(300) == 44;
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_narrow_return_is_truncated_by_callee")?,
        1
    );
    Ok(())
}

#[test]
fn test_void_function_for_side_effect() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int value;

        void set(int v) {
            value = v;
        }

        int main() {
            set(19);
            return value;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_void_function_for_side_effect")?, 19);
    Ok(())
}

#[test]
fn test_nested_call_results_feed_arguments() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        int twice(int x) {
            return x * 2;
        }

        int add(int a, int b) {
            return a + b;
        }

        int main() {
            return add(twice(twice(3)), twice(5));
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_nested_call_results_feed_arguments")?,
        22
    );
    Ok(())
}

#[test]
fn test_argument_evaluation_preserved_across_stack_args() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    // Arguments that are themselves calls exercise the push ordering
    // around the later register loads.
    let c_code = r#"
        int id(int x) {
            return x;
        }

        int sum7(int a, int b, int c, int d, int e, int f, int g) {
            return a + b * 2 + c * 3 + d * 4 + e * 5 + f * 6 + g * 7;
        }

        int main() {
            return sum7(id(1), 1, id(1), 1, id(1), 1, id(2));
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_argument_evaluation_preserved_across_stack_args")?,
        35
    );
    Ok(())
}
