
#[cfg(test)]
mod tests {
    use crate::types::{DesiredOutcome, MethodFlags, ReturnKind, Span};

    #[test]
    fn descriptors_map_to_kinds() {
        assert_eq!(ReturnKind::from_descriptor("Z"), Some(ReturnKind::Boolean));
        assert_eq!(ReturnKind::from_descriptor("S"), Some(ReturnKind::Integer));
        assert_eq!(ReturnKind::from_descriptor("J"), Some(ReturnKind::WideInteger));
        assert_eq!(
            ReturnKind::from_descriptor("[Ljava/lang/String;"),
            Some(ReturnKind::ObjectReference)
        );
        assert_eq!(ReturnKind::from_descriptor("Q"), None);
    }

    #[test]
    fn spans_are_half_open() {
        let span = Span::new(3, 9);
        assert_eq!(span.len(), 6);
        assert!(!span.is_empty());
        assert_eq!(format!("{span}"), "[3, 9)");
        assert!(Span::new(4, 4).is_empty());
    }

    #[test]
    fn outcome_compatibility() {
        assert!(DesiredOutcome::ForceBoolean(true).fits(ReturnKind::Boolean));
        assert!(!DesiredOutcome::ForceBoolean(true).fits(ReturnKind::Integer));
        assert!(DesiredOutcome::ForceInteger(7).fits(ReturnKind::WideInteger));
        assert!(DesiredOutcome::ForceReferenceEmpty.fits(ReturnKind::ObjectReference));
        assert!(DesiredOutcome::NoOp.fits(ReturnKind::Void));
    }

    #[test]
    fn modifier_words_map_to_flags() {
        assert_eq!(MethodFlags::from_word("public"), Some(MethodFlags::PUBLIC));
        assert_eq!(MethodFlags::from_word("native"), Some(MethodFlags::NATIVE));
        assert_eq!(
            MethodFlags::from_word("declared-synchronized"),
            Some(MethodFlags::DECLARED_SYNCHRONIZED)
        );
        assert_eq!(MethodFlags::from_word("isRooted"), None);
    }
}
