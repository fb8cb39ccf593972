use std::time::Duration;

use rlisp::{run, run_with_timeout, Error, DEFAULT_TIMEOUT};

#[test]
fn infinite_loops_are_killed_at_the_deadline() {
    let source = "(define (spin n) (if (= n 0) 0 (spin (+ n 1)))) (spin 1)";
    match run_with_timeout(source, Duration::from_millis(50)) {
        Err(Error::Timeout(timeout)) => assert_eq!(timeout, Duration::from_millis(50)),
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[test]
fn fast_batches_finish_under_the_deadline() {
    let values = run_with_timeout("(+ 1 2) (strcat 'a' 'b')", Duration::from_secs(5))
        .expect("batch should finish");
    assert_eq!(values, vec!["3.0".to_string(), "ab".to_string()]);
}

#[test]
fn rendered_results_cover_every_top_level_form() {
    let values = run_with_timeout("(define x 4) (list x 'b')", Duration::from_secs(5))
        .expect("batch should finish");
    assert_eq!(values, vec!["null".to_string(), "(4.0, (b, null))".to_string()]);
}

#[test]
fn evaluation_errors_pass_through_the_supervisor() {
    match run_with_timeout("(car 1)", Duration::from_secs(5)) {
        Err(Error::Eval(_)) => {}
        other => panic!("expected an evaluation error, got {:?}", other),
    }
}

#[test]
fn the_default_deadline_is_finite() {
    assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(10));
    assert_eq!(run("(+ 1 1)").expect("batch should finish"), vec!["2.0".to_string()]);
}
