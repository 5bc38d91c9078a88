use tjunkie::ast::{Expr, ExprId, Stmt};
use tjunkie::error::LoxError;
use tjunkie::parser::Parser;
use tjunkie::resolver::{Locals, Resolver};
use tjunkie::scanner::scan_tokens;

fn resolve(src: &str) -> (Locals, Vec<String>) {
    let (tokens, lex_errors) = scan_tokens(src);
    assert!(lex_errors.is_empty());

    let statements = Parser::new(&tokens).parse().unwrap();
    let (locals, errors) = Resolver::new().resolve_program(&statements);

    (locals, errors.iter().map(|e| e.to_string()).collect())
}

fn resolve_errors(src: &str) -> Vec<String> {
    resolve(src).1
}

#[test]
fn test_globals_are_left_out_of_the_table() {
    let (locals, errors) = resolve("var a = 1; print a; a = 2;");

    assert!(errors.is_empty());
    assert!(locals.is_empty());
}

#[test]
fn test_local_distances() {
    let src = "{ var a = 1; { var b = a; print b; } }";
    let (tokens, _) = scan_tokens(src);
    let statements = Parser::new(&tokens).parse().unwrap();
    let locals = Resolver::new().resolve(&statements).unwrap();

    let Stmt::Block(outer) = &statements[0] else {
        panic!("expected block");
    };
    let Stmt::Block(inner) = &outer[1] else {
        panic!("expected inner block");
    };

    let read_a = match &inner[0] {
        Stmt::Var {
            initializer: Some(Expr::Variable { id, .. }),
            ..
        } => *id,
        other => panic!("unexpected statement: {:?}", other),
    };
    let read_b = match &inner[1] {
        Stmt::Print(Expr::Variable { id, .. }) => *id,
        other => panic!("unexpected statement: {:?}", other),
    };

    assert_eq!(locals.get(&read_a), Some(&1));
    assert_eq!(locals.get(&read_b), Some(&0));
}

#[test]
fn test_function_parameters_share_the_body_scope() {
    let (locals, errors) = resolve("fun f(x) { return x; }");

    assert!(errors.is_empty());
    assert_eq!(locals.values().copied().collect::<Vec<_>>(), vec![0]);
}

#[test]
fn test_this_and_super_distances() {
    let (locals, errors) =
        resolve("class A { m() {} } class B < A { m() { this; super.m(); } }");

    assert!(errors.is_empty());

    let mut distances: Vec<(ExprId, usize)> = locals.into_iter().collect();
    distances.sort();

    // `this` is one frame out of the method body, `super` two.
    let only_distances: Vec<usize> = distances.into_iter().map(|(_, d)| d).collect();
    assert_eq!(only_distances, vec![1, 2]);
}

#[test]
fn test_read_in_own_initializer() {
    assert_eq!(
        resolve_errors("{ var a = a; }"),
        vec!["[line 1] Error: Can't read local variable in its own initializer."]
    );

    assert_eq!(
        resolve_errors("var a = a;"),
        vec!["[line 1] Error: Can't read local variable in its own initializer."]
    );

    // Reading an outer binding of the same name is fine once declared.
    assert!(resolve_errors("var a = 1; { var b = a; }").is_empty());
}

#[test]
fn test_redeclaration_shadows() {
    assert!(resolve_errors("{ var a = 1; var a = 2; print a; }").is_empty());
}

#[test]
fn test_misplaced_return() {
    assert_eq!(
        resolve_errors("return 1;"),
        vec!["[line 1] Error: Can't return from top-level code."]
    );

    assert_eq!(
        resolve_errors("class A { init() { return 1; } }"),
        vec!["[line 1] Error: Can't return a value from an initializer."]
    );

    assert!(resolve_errors("class A { init() { return; } }").is_empty());
}

#[test]
fn test_misplaced_this_and_super() {
    assert_eq!(
        resolve_errors("print this;"),
        vec!["[line 1] Error: Can't use 'this' outside of a class."]
    );

    assert_eq!(
        resolve_errors("fun f() { super.m(); }"),
        vec!["[line 1] Error: Can't use 'super' outside of a class."]
    );

    assert_eq!(
        resolve_errors("class A { m() { super.m(); } }"),
        vec!["[line 1] Error: Can't use 'super' in a class with no superclass."]
    );
}

#[test]
fn test_class_inheriting_from_itself() {
    assert_eq!(
        resolve_errors("class A < A {}"),
        vec!["[line 1] Error: A class can't inherit from itself."]
    );
}

#[test]
fn test_collects_every_error() {
    let errors = resolve_errors("return;\nprint this;\n");

    assert_eq!(errors.len(), 2);
    assert!(errors[0].starts_with("[line 1]"));
    assert!(errors[1].starts_with("[line 2]"));
}

#[test]
fn test_resolve_is_deterministic() {
    let src = "var g = 0; fun outer() { var x = 1; fun inner() { return x + g; } return inner; }";
    let (tokens, _) = scan_tokens(src);
    let statements = Parser::new(&tokens).parse().unwrap();

    let first = Resolver::new().resolve(&statements).unwrap();
    let second = Resolver::new().resolve(&statements).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_resolve_fails_with_compile_error() {
    let (tokens, _) = scan_tokens("return;");
    let statements = Parser::new(&tokens).parse().unwrap();

    assert!(matches!(
        Resolver::new().resolve(&statements),
        Err(LoxError::Compile(errors)) if errors.len() == 1
    ));
}
