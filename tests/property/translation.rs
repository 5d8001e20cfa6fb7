use analytica_core::{translate, AnalyticalError, ErrorCode};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Translation is total: any message produces a classified error.
    #[test]
    fn every_message_translates(message in ".{0,200}") {
        let err = translate(Box::from(message.clone()));
        prop_assert!(!err.code().as_str().is_empty());
        // Stable identifiers survive the round trip through strings.
        prop_assert_eq!(ErrorCode::parse(err.code().as_str()), Some(err.code()));
    }

    /// translate(translate(x)) == translate(x) on code, message and context.
    #[test]
    fn translation_is_idempotent(message in ".{0,200}") {
        let once = translate(Box::from(message));
        let twice = translate(Box::new(once.clone()));
        prop_assert_eq!(once.code(), twice.code());
        prop_assert_eq!(once.message(), twice.message());
        prop_assert_eq!(once.context(), twice.context());
    }

    /// The recoverable flag is determined by the code alone at construction.
    #[test]
    fn recoverability_follows_the_code(message in ".{0,200}")  {
        let err = translate(Box::from(message));
        prop_assert_eq!(err.is_recoverable(), err.code().default_recoverable());
    }

    /// Wrapping with a tool name never changes code or context.
    #[test]
    fn tool_attachment_preserves_identity(message in ".{1,80}", tool in "[a-z_]{1,20}") {
        let base = AnalyticalError::new(ErrorCode::CalculationFailed, message.clone());
        let wrapped = base.clone().with_tool(tool);
        prop_assert_eq!(base.code(), wrapped.code());
        prop_assert_eq!(base.message(), wrapped.message());
        prop_assert_eq!(base.context(), wrapped.context());
    }
}
