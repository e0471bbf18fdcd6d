//! Reply parsing and validation
//!
//! Replies are whitespace-delimited ASCII fields with no length prefix or
//! checksum, so the only shape check available is the field count each
//! command family expects. Shape failures (`ResponseLength`) and content
//! failures (`ResponseValue`) are reported separately, both carrying the
//! literal offending response for diagnosis.

use tracing::debug;

use super::error::ProtocolError;

/// Split a reply into fields, validating the exact expected count.
///
/// An all-whitespace reply is reported as an empty response rather than an
/// arity mismatch. With `verbose` the fields of a mismatched reply are
/// dumped one per line.
pub(crate) fn fields<'a>(
    response: &'a str,
    expected: usize,
    verbose: bool,
) -> Result<Vec<&'a str>, ProtocolError> {
    let tokens: Vec<&str> = response.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ProtocolError::EmptyResponse);
    }
    if tokens.len() != expected {
        if verbose {
            for (i, token) in tokens.iter().enumerate() {
                debug!("[{i}] = {token:?}");
            }
        }
        return Err(ProtocolError::ResponseLength {
            expected,
            actual: tokens.len(),
            response: response.to_string(),
        });
    }
    Ok(tokens)
}

/// Parse one field as an integer.
pub(crate) fn int_field(field: &str, response: &str) -> Result<i32, ProtocolError> {
    field.parse().map_err(|_| ProtocolError::ResponseValue {
        field: field.to_string(),
        response: response.to_string(),
    })
}

/// Parse one field as a float.
pub(crate) fn float_field(field: &str, response: &str) -> Result<f64, ProtocolError> {
    field.parse().map_err(|_| ProtocolError::ResponseValue {
        field: field.to_string(),
        response: response.to_string(),
    })
}

/// Parse a run of fields as integers.
pub(crate) fn int_fields(fields: &[&str], response: &str) -> Result<Vec<i32>, ProtocolError> {
    fields.iter().map(|f| int_field(f, response)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exact_arity_accepted() {
        let tokens = fields("q 6 42", 3, false).unwrap();
        assert_eq!(tokens, vec!["q", "6", "42"]);
    }

    #[test]
    fn arity_mismatch_names_actual_and_expected() {
        let err = fields("q 6", 3, false).unwrap_err();
        match err {
            ProtocolError::ResponseLength {
                expected,
                actual,
                response,
            } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
                assert_eq!(response, "q 6");
            }
            other => panic!("expected ResponseLength, got {other:?}"),
        }
    }

    #[test]
    fn blank_reply_is_empty_response() {
        assert!(matches!(
            fields("   ", 3, false),
            Err(ProtocolError::EmptyResponse)
        ));
        assert!(matches!(
            fields("", 1, false),
            Err(ProtocolError::EmptyResponse)
        ));
    }

    #[test]
    fn shape_and_content_errors_are_distinct() {
        // right shape, bad content
        let raw = "q 6 lots";
        let tokens = fields(raw, 3, false).unwrap();
        let err = int_field(tokens[2], raw).unwrap_err();
        assert!(matches!(err, ProtocolError::ResponseValue { .. }));
    }

    #[test]
    fn runs_of_whitespace_collapse() {
        let tokens = fields("a   101\t202  303", 4, false).unwrap();
        assert_eq!(tokens, vec!["a", "101", "202", "303"]);
    }

    #[test]
    fn int_fields_parses_all_or_fails() {
        let raw = "a 1 2 3";
        let tokens = fields(raw, 4, false).unwrap();
        assert_eq!(int_fields(&tokens[1..], raw).unwrap(), vec![1, 2, 3]);

        let raw = "a 1 x 3";
        let tokens = fields(raw, 4, false).unwrap();
        assert!(int_fields(&tokens[1..], raw).is_err());
    }

    #[test]
    fn float_field_accepts_decimals_and_negatives() {
        assert_eq!(float_field("45.12345", "").unwrap(), 45.12345);
        assert_eq!(int_field("-120", "").unwrap(), -120);
    }
}
