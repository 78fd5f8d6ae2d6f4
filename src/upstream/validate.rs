use serde_json::Value;

use super::UpstreamError;

const ERR_CODE: &str = "ErrCode";
const ERR_MSG: &str = "ErrMsg";

/// Fails with [`UpstreamError::Application`] when the body carries a non-zero `ErrCode`.
///
/// HTTP success doesn't mean the platform accepted the call, so every decoded
/// body goes through here before anything reads its payload.
pub fn validate(body: Value) -> Result<Value, UpstreamError> {
    let code = match body.get(ERR_CODE) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(body),
        Some(Value::Number(code)) if code.as_f64() == Some(0.0) => return Ok(body),
        Some(Value::String(code)) if code.trim().parse::<f64>() == Ok(0.0) => return Ok(body),
        Some(Value::String(code)) => code.clone(),
        Some(code) => code.to_string(),
    };

    let message = body
        .get(ERR_MSG)
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    Err(UpstreamError::Application { code, message })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn zero_or_missing_code_passes_through() {
        for body in [
            json!({"ErrCode": 0, "Resp": {"video_id": 1}}),
            json!({"Resp": {"video_id": 1}}),
            json!({"ErrCode": null}),
            json!({"ErrCode": 0.0}),
            json!({"ErrCode": false}),
            json!({"ErrCode": "0"}),
        ] {
            assert_eq!(validate(body.clone()).expect("valid body"), body);
        }
    }

    #[test]
    fn non_zero_code_fails_the_same_way_every_time() {
        let body = json!({"ErrCode": 10005, "ErrMsg": "token expired"});
        for _ in 0..2 {
            match validate(body.clone()) {
                Err(UpstreamError::Application { code, message }) => {
                    assert_eq!(code, "10005");
                    assert_eq!(message, "token expired");
                }
                other => panic!("expected application error, got {other:?}"),
            }
        }
    }

    #[test]
    fn missing_message_gets_a_placeholder() {
        let err = validate(json!({"ErrCode": "7"})).expect_err("string code is still a code");
        assert_eq!(err.to_string(), "Pixverse error 7: Unknown error");
    }

    #[test]
    fn odd_codes_are_reported_verbatim() {
        for (body, expected) in [
            (json!({"ErrCode": "abc"}), "abc"),
            (json!({"ErrCode": 18446744073709551615_u64}), "18446744073709551615"),
            (json!({"ErrCode": 2.5}), "2.5"),
            (json!({"ErrCode": true}), "true"),
        ] {
            match validate(body) {
                Err(UpstreamError::Application { code, .. }) => assert_eq!(code, expected),
                other => panic!("expected application error, got {other:?}"),
            }
        }
    }
}
