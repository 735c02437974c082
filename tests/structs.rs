//! Struct and union semantics: member access, copies, and the by-value
//! calling convention for every record size class.

use kolak::error::CompilerError;
use kolak::test_utils::{compile_and_run, have_toolchain};

type TestResult = Result<(), CompilerError>;

#[test]
fn test_struct_member_access() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct point {
            int x;
            int y;
        };

        int main() {
            struct point p;
            p.x = 10;
            p.y = 20;
            return p.x + p.y;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_struct_member_access")?, 30);
    Ok(())
}

#[test]
fn test_pointer_member_access() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct point {
            int x;
            int y;
        };

        int main() {
            struct point p;
            struct point *ptr = &p;
            ptr->x = 10;
            ptr->y = 20;
            return ptr->x + ptr->y;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_pointer_member_access")?, 30);
    Ok(())
}

#[test]
fn test_union_members_share_storage() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        union data {
            int i;
            char c;
        };

        int main() {
            union data d;
            d.i = 65;
            return d.c;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_union_members_share_storage")?, 65);
    Ok(())
}

#[test]
fn test_struct_assignment_copies_value() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct point {
            int x;
            int y;
        };

        int main() {
            struct point a;
            struct point b;
            a.x = 1;
            a.y = 2;
            b = a;
            a.x = 50;
            return b.x * 10 + b.y;
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_struct_assignment_copies_value")?,
        12
    );
    Ok(())
}

#[test]
fn test_struct_by_value_argument_is_a_copy() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct point {
            int x;
            int y;
        };

        int bump(struct point p) {
            p.x = p.x + 100;
            return p.x;
        }

        int main() {
            struct point p;
            p.x = 5;
            p.y = 0;
            int r = bump(p);
            return r - p.x;
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_struct_by_value_argument_is_a_copy")?,
        100
    );
    Ok(())
}

#[test]
fn test_large_struct_by_value_argument() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct big {
            long a;
            long b;
            long c;
        };

        long take(struct big v) {
            v.a = v.a + 1;
            return v.a + v.b + v.c;
        }

        int main() {
            struct big v;
            v.a = 1;
            v.b = 2;
            v.c = 3;
            long r = take(v);
            return (int)(r * 10 + v.a);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_large_struct_by_value_argument")?,
        71
    );
    Ok(())
}

#[test]
fn test_small_struct_return() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct pair {
            int x;
            int y;
        };

        struct pair make(int x, int y) {
            struct pair p;
            p.x = x;
            p.y = y;
            return p;
        }

        int main() {
            struct pair p;
            p = make(3, 4);
            return p.x * 10 + p.y;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_small_struct_return")?, 34);
    Ok(())
}

#[test]
fn test_two_register_struct_return() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct quad {
            long a;
            long b;
        };

        struct quad make(long a, long b) {
            struct quad q;
            q.a = a;
            q.b = b;
            return q;
        }

        int main() {
            struct quad q;
            q = make(7, 9);
            return (int)(q.a * 10 + q.b);
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_two_register_struct_return")?, 79);
    Ok(())
}

#[test]
fn test_large_struct_return_through_hidden_pointer() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct big {
            long a;
            long b;
            long c;
        };

        struct big make() {
            struct big v;
            v.a = 1;
            v.b = 2;
            v.c = 3;
            return v;
        }

        int main() {
            struct big v;
            v = make();
            return (int)(v.a * 100 + v.b * 10 + v.c);
        }
    "#;
    assert_eq!(
        compile_and_run(c_code, "test_large_struct_return_through_hidden_pointer")?,
        123
    );
    Ok(())
}

#[test]
fn test_odd_size_struct_round_trip() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct trio {
            int a;
            int b;
            int c;
        };

        struct trio make() {
            struct trio t;
            t.a = 1;
            t.b = 2;
            t.c = 3;
            return t;
        }

        int take(struct trio t) {
            return t.a + t.b * 4 + t.c * 16;
        }

        int main() {
            struct trio t;
            t = make();
            return take(t);
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_odd_size_struct_round_trip")?, 57);
    Ok(())
}

#[test]
fn test_nested_struct_member() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct inner {
            int v;
        };

        struct outer {
            struct inner in;
            int pad;
        };

        int main() {
            struct outer o;
            o.in.v = 77;
            o.pad = 1;
            return o.in.v;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_nested_struct_member")?, 77);
    Ok(())
}

#[test]
fn test_self_referential_node() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct node {
            struct node *next;
            int value;
        };

        int main() {
            struct node a;
            struct node b;
            a.value = 1;
            b.value = 2;
            a.next = &b;
            b.next = &a;
            return a.next->value * 10 + a.next->next->value;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_self_referential_node")?, 21);
    Ok(())
}

#[test]
fn test_array_of_structs() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct point {
            int x;
            int y;
        };

        int main() {
            struct point pts[3];
            for (int i = 0; i < 3; i++) {
                pts[i].x = i;
                pts[i].y = i * 2;
            }
            return pts[2].x * 10 + pts[2].y;
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_array_of_structs")?, 24);
    Ok(())
}

#[test]
fn test_struct_layout_padding() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        struct padded {
            char c;
            long l;
            int i;
        };

        int main() {
            return sizeof(struct padded);
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_struct_layout_padding")?, 24);
    Ok(())
}

#[test]
fn test_union_size_is_widest_member() -> TestResult {
    if !have_toolchain() {
        return Ok(());
    }
    let c_code = r#"
        union mixed {
            char c;
            long l;
            int i;
        };

        int main() {
            return sizeof(union mixed);
        }
    "#;
    assert_eq!(compile_and_run(c_code, "test_union_size_is_widest_member")?, 8);
    Ok(())
}
