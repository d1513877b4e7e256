use crate::source::SourceError;

/// How the engine treats a failed fetch for one processing unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The pair can't be read at all, typically because the event type was
    /// never provisioned upstream. Handled like a bucket with no events.
    PermanentlyInapplicable,
    /// Retried on the next poll tick.
    Transient,
}

pub fn classify(err: &SourceError) -> ErrorClass {
    match err {
        SourceError::Unauthenticated(_)
        | SourceError::Unauthorized(_)
        | SourceError::UnprocessableRequest(_) => ErrorClass::PermanentlyInapplicable,
        SourceError::Transient(_) => ErrorClass::Transient,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_and_request_errors_are_permanent() {
        for err in [
            SourceError::Unauthenticated("401".into()),
            SourceError::Unauthorized("403".into()),
            SourceError::UnprocessableRequest("422".into()),
        ] {
            assert_eq!(classify(&err), ErrorClass::PermanentlyInapplicable);
        }
    }

    #[test]
    fn transient_stays_transient() {
        assert_eq!(
            classify(&SourceError::Transient("timeout".into())),
            ErrorClass::Transient
        );
    }
}
