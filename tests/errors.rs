use rlisp::error::{Error, EvalError, EvalErrorKind, SyntaxError};
use rlisp::eval_source;

fn eval_err(source: &str) -> EvalError {
    match eval_source(source) {
        Err(Error::Eval(e)) => e,
        other => panic!("expected an evaluation error, got {:?}", other),
    }
}

fn syntax_err(source: &str) -> SyntaxError {
    match eval_source(source) {
        Err(Error::Syntax(e)) => e,
        other => panic!("expected a syntax error, got {:?}", other),
    }
}

#[test]
fn operand_type_contracts() {
    assert_eq!(eval_err("(+ 'a' 1)").kind, EvalErrorKind::TypeMismatch);
    assert_eq!(eval_err("(- 'abc' 1)").kind, EvalErrorKind::TypeMismatch);
    assert_eq!(eval_err("(car 1)").kind, EvalErrorKind::TypeMismatch);
    assert_eq!(eval_err("(strcat 'a' 1)").kind, EvalErrorKind::TypeMismatch);
    assert_eq!(eval_err("(< 'a' 1)").kind, EvalErrorKind::TypeMismatch);
    assert_eq!(eval_err("(= 'a' 1)").kind, EvalErrorKind::TypeMismatch);
    assert_eq!(eval_err("(if 1 2 3)").kind, EvalErrorKind::TypeMismatch);
}

#[test]
fn operand_counts() {
    assert_eq!(eval_err("(- 1)").kind, EvalErrorKind::ArityMismatch);
    assert_eq!(eval_err("(- 1 2 3)").kind, EvalErrorKind::ArityMismatch);
    assert_eq!(eval_err("(car)").kind, EvalErrorKind::ArityMismatch);
    assert_eq!(eval_err("(car 1 2)").kind, EvalErrorKind::ArityMismatch);
    assert_eq!(eval_err("(if True 1)").kind, EvalErrorKind::ArityMismatch);
    assert_eq!(eval_err("(if True 1 2 3)").kind, EvalErrorKind::ArityMismatch);
}

#[test]
fn arity_is_checked_before_operand_types() {
    // The string operand would be a type error, but the count fails first.
    assert_eq!(eval_err("(- 'a' 1 2)").kind, EvalErrorKind::ArityMismatch);
}

#[test]
fn function_arity() {
    assert_eq!(
        eval_err("(define (f x) x) (f)").kind,
        EvalErrorKind::ArityMismatch
    );
    assert_eq!(
        eval_err("(define (f x) x) (f 1 2)").kind,
        EvalErrorKind::ArityMismatch
    );
}

#[test]
fn unknown_identifiers() {
    assert_eq!(eval_err("x").kind, EvalErrorKind::UnknownIdentifier);
    assert_eq!(eval_err("(y 1)").kind, EvalErrorKind::UnknownIdentifier);
    // A call head is not parsed as a literal.
    assert_eq!(eval_err("(1 2 3)").kind, EvalErrorKind::UnknownIdentifier);
}

#[test]
fn free_names_must_resolve_at_definition_time() {
    assert_eq!(
        eval_err("(define (f n) (g n))").kind,
        EvalErrorKind::UsedBeforeDefined
    );
}

#[test]
fn bodies_must_produce_a_value() {
    assert_eq!(
        eval_err("(define (f) (define a 1)) (f)").kind,
        EvalErrorKind::MissingFunctionBody
    );
}

#[test]
fn malformed_special_forms() {
    assert_eq!(eval_err("(lambda x x)").kind, EvalErrorKind::StructuralError);
    assert_eq!(eval_err("(define x)").kind, EvalErrorKind::StructuralError);
    assert_eq!(eval_err("()").kind, EvalErrorKind::StructuralError);
    assert_eq!(
        eval_err("(define (f (x)) x)").kind,
        EvalErrorKind::StructuralError
    );
}

#[test]
fn values_are_not_callable() {
    assert_eq!(eval_err("(define x 1) (x 2)").kind, EvalErrorKind::TypeMismatch);
}

#[test]
fn later_forms_are_not_attempted_after_an_error() {
    // The define after the failure must not run; if it did, the batch would
    // succeed with two results.
    let err = eval_err("(car 1) (define ok 1) ok");
    assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
}

#[test]
fn tracebacks_name_each_pending_operator() {
    let err = eval_err("(define (f) (car 1))\n(f)");
    assert_eq!(err.trace.len(), 2);
    assert!(err.trace[0].contains("line 1, in <function 'f'>"));
    assert!(err.trace[0].contains("(define (f) (car 1))"));
    assert!(err.trace[1].contains("<operator 'car'>"));

    let rendered = err.to_string();
    assert!(rendered.starts_with("traceback"));
    assert!(rendered.ends_with(&err.message));
}

#[test]
fn parse_failures_stop_the_whole_batch() {
    assert!(matches!(syntax_err(")"), SyntaxError::UnmatchedClose(_)));
    assert!(matches!(syntax_err("(+ 1"), SyntaxError::UnexpectedEof(_)));
    assert!(matches!(
        syntax_err("(define x \"abc"),
        SyntaxError::UnterminatedString(_)
    ));
}
