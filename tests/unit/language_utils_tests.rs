/*!
 * Tests for language tag utilities
 */

use pdftrans::language_utils::{
    get_language_name, is_unspaced_script, language_codes_match, normalize_to_part2t,
    primary_language_code, validate_language_tag,
};

#[test]
fn test_validateLanguageTag_withCommonTags_shouldAccept() {
    for tag in ["en", "zh-CN", "pt_BR", "fre", "deu", "ja"] {
        assert!(validate_language_tag(tag).is_ok(), "{} should be valid", tag);
    }
    for tag in ["", "xx", "english", "e"] {
        assert!(validate_language_tag(tag).is_err(), "{} should be invalid", tag);
    }
}

#[test]
fn test_primaryLanguageCode_shouldNormalizeToPart1() {
    assert_eq!(primary_language_code("ger").unwrap(), "de");
    assert_eq!(primary_language_code("zh-TW").unwrap(), "zh");
    assert_eq!(normalize_to_part2t("fr").unwrap(), "fra");
    assert_eq!(get_language_name("es").unwrap(), "Spanish");
}

#[test]
fn test_languageCodesMatch_andUnspacedScripts() {
    assert!(language_codes_match("en", "eng"));
    assert!(!language_codes_match("en", "fr"));
    assert!(is_unspaced_script("ja"));
    assert!(is_unspaced_script("zh-Hans"));
    assert!(!is_unspaced_script("ko"));
}
