use super::*;

#[test]
fn codes_parse_back() {
    for code in ErrorCode::ALL {
        assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(*code));
    }
    assert!("E4242".parse::<ErrorCode>().is_err());
}

#[test]
fn stage_classification() {
    assert!(ErrorCode::E0003.is_lexer_error());
    assert!(ErrorCode::E1005.is_parser_error());
    assert!(ErrorCode::E2009.is_type_error());
    assert!(ErrorCode::E5001.is_codegen_error());
    assert!(ErrorCode::W006.is_warning());
    assert!(!ErrorCode::W006.is_type_error());
}
