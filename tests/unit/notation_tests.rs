/*!
 * Tests for notation detection and placeholder protection
 */

use pdftrans::app_config::NotationConfig;
use pdftrans::translation::NotationGuard;
use pdftrans::translation::notation::restore_placeholders;

fn guard() -> NotationGuard {
    NotationGuard::new(&NotationConfig::default()).unwrap()
}

#[test]
fn test_guard_withInlineMath_shouldRestoreAfterReordering() {
    let guard = guard();
    let guarded = guard.guard(r"Let $a$ and \(b^2\) be given");

    assert_eq!(guarded.text, "Let {v0} and {v1} be given");
    assert_eq!(guarded.spans, vec!["$a$".to_string(), r"\(b^2\)".to_string()]);

    // A translation may move placeholders around
    let restored = guard.restore("Soient {v1} et {v0} donnés", &guarded.spans).unwrap();
    assert_eq!(restored, r"Soient \(b^2\) et $a$ donnés");
}

#[test]
fn test_guard_withoutNotation_shouldLeaveTextAlone() {
    let guarded = guard().guard("Plain prose without formulas.");
    assert_eq!(guarded.text, "Plain prose without formulas.");
    assert!(guarded.spans.is_empty());
}

#[test]
fn test_restore_withInventedPlaceholder_shouldFail() {
    let spans = vec!["$x$".to_string()];
    assert!(restore_placeholders("{v0} and {v1}", &spans).is_err());
    assert!(restore_placeholders("nothing left", &spans).is_err());
}

#[test]
fn test_classifyRun_withMathFontsAndSymbols_shouldDetectNotation() {
    let guard = guard();
    assert!(guard.classify_run("x", "CMMI10"));
    assert!(guard.classify_run("x", "ABCDEF+CMSY10"));
    assert!(guard.classify_run("f(x)", "LMMono10-Regular"));
    assert!(guard.classify_run("∑ ∫ ≤", "Helvetica"));
    assert!(!guard.classify_run("Results", "CMR10"));
    assert!(!guard.classify_run("   ", "CMMI10"));
}
