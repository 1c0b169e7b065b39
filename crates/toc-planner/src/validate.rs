//! Intent and plan validation (spec §4.5 steps 1 and 4).

use toc_kernel::error::CoreError;
use toc_kernel::model::{Step, StepAction, MAX_INTENT_CHARS, MAX_PLAN_STEPS};
use url::Url;

pub const MAX_NAVIGATE_URL_CHARS: usize = 2048;

const DISALLOWED_SCHEMES: &[&str] = &["javascript", "file", "data", "vbscript"];

pub fn validate_intent(intent: &str) -> Result<(), CoreError> {
    if intent.trim().is_empty() {
        return Err(CoreError::Validation("intent must not be empty".into()));
    }
    if intent.chars().count() > MAX_INTENT_CHARS {
        return Err(CoreError::Validation(format!(
            "intent exceeds {MAX_INTENT_CHARS} chars"
        )));
    }
    Ok(())
}

/// Navigate URL validation (spec §4.5 step 4, §8 boundary: 2048 accepted,
/// 2049 rejected). `allow_localhost` mirrors the `ALLOW_LOCALHOST` env var
/// (spec §6) letting local/dev deployments target internal hosts.
pub fn validate_navigate_url(raw: &str, allow_localhost: bool) -> Result<(), CoreError> {
    if raw.chars().count() > MAX_NAVIGATE_URL_CHARS {
        return Err(CoreError::Validation(format!(
            "navigate url exceeds {MAX_NAVIGATE_URL_CHARS} chars"
        )));
    }

    let parsed = Url::parse(raw)
        .map_err(|e| CoreError::Validation(format!("navigate url is not a valid URL: {e}")))?;

    if DISALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(CoreError::Validation(format!(
            "navigate url scheme {:?} is not permitted",
            parsed.scheme()
        )));
    }
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(CoreError::Validation(
            "navigate url must be http:// or https://".into(),
        ));
    }

    if !allow_localhost && is_internal_host(&parsed) {
        return Err(CoreError::Validation(
            "navigate url targets an internal host; set ALLOW_LOCALHOST to permit".into(),
        ));
    }

    Ok(())
}

fn is_internal_host(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(d)) => d == "localhost" || d.ends_with(".localhost") || d.ends_with(".local"),
        Some(url::Host::Ipv4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback() || (ip.segments()[0] & 0xfe00) == 0xfc00,
        None => false,
    }
}

/// Full plan validation (spec §4.5 step 4): step count bound, per-step
/// timeout/retry bounds, and navigate URL checks.
pub fn validate_plan_steps(steps: &[Step], allow_localhost: bool) -> Result<(), CoreError> {
    if steps.is_empty() {
        return Err(CoreError::Validation("plan has no steps".into()));
    }
    if steps.len() > MAX_PLAN_STEPS {
        return Err(CoreError::Validation(format!(
            "plan has {} steps, exceeds max {MAX_PLAN_STEPS}",
            steps.len()
        )));
    }
    for (index, step) in steps.iter().enumerate() {
        step.validate()
            .map_err(|e| CoreError::Validation(format!("step {index}: {e}")))?;
        if step.action == StepAction::Navigate {
            let url = step
                .params
                .get("url")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    CoreError::Validation(format!("step {index}: navigate requires a url param"))
                })?;
            validate_navigate_url(url, allow_localhost)
                .map_err(|e| CoreError::Validation(format!("step {index}: {e}")))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(action: StepAction, params: serde_json::Value) -> Step {
        Step { action, params, timeout_ms: 5000, retries: 0 }
    }

    #[test]
    fn empty_intent_rejected() {
        assert!(validate_intent("").is_err());
        assert!(validate_intent("   ").is_err());
    }

    #[test]
    fn oversized_intent_rejected() {
        let big = "a".repeat(5001);
        assert!(validate_intent(&big).is_err());
    }

    #[test]
    fn url_boundary_2048_accepted_2049_rejected() {
        let padding_len = MAX_NAVIGATE_URL_CHARS - "https://example.com/".len();
        let ok_url = format!("https://example.com/{}", "a".repeat(padding_len));
        assert_eq!(ok_url.chars().count(), MAX_NAVIGATE_URL_CHARS);
        assert!(validate_navigate_url(&ok_url, false).is_ok());

        let too_long = format!("{ok_url}x");
        assert!(validate_navigate_url(&too_long, false).is_err());
    }

    #[test]
    fn javascript_scheme_rejected() {
        assert!(validate_navigate_url("javascript:alert(1)", false).is_err());
    }

    #[test]
    fn localhost_rejected_unless_allowed() {
        assert!(validate_navigate_url("http://localhost:3000", false).is_err());
        assert!(validate_navigate_url("http://localhost:3000", true).is_ok());
    }

    #[test]
    fn plan_step_count_boundary() {
        let ok_steps: Vec<Step> = (0..100).map(|_| step(StepAction::Wait, json!({}))).collect();
        assert!(validate_plan_steps(&ok_steps, false).is_ok());

        let too_many: Vec<Step> = (0..101).map(|_| step(StepAction::Wait, json!({}))).collect();
        assert!(validate_plan_steps(&too_many, false).is_err());
    }

    #[test]
    fn navigate_step_missing_url_rejected() {
        let steps = vec![step(StepAction::Navigate, json!({}))];
        assert!(validate_plan_steps(&steps, false).is_err());
    }
}
