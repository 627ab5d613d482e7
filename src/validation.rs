use crate::constants::{MAX_ANSWER_INPUT_CHARS, MAX_TOPIC_INPUT_CHARS};

/// 密码策略：8-256 字节，且必须同时包含大写、小写和数字。
/// 字节上限防止超长输入拖慢 argon2 哈希。
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if password.len() > 256 {
        return Err("Password must be at most 256 characters long".to_string());
    }

    let mut upper = 0usize;
    let mut lower = 0usize;
    let mut digit = 0usize;
    for ch in password.chars() {
        if ch.is_ascii_uppercase() {
            upper += 1;
        } else if ch.is_ascii_lowercase() {
            lower += 1;
        } else if ch.is_ascii_digit() {
            digit += 1;
        }
    }

    if upper == 0 || lower == 0 || digit == 0 {
        return Err(
            "Password must contain an uppercase letter, a lowercase letter and a digit".to_string(),
        );
    }
    Ok(())
}

/// Pragmatic email check, not a full RFC 5321 parser. Callers lowercase the
/// address before storing it.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    local_part_ok(local) && domain_ok(domain)
}

fn local_part_ok(local: &str) -> bool {
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'))
}

fn domain_ok(domain: &str) -> bool {
    let mut count = 0;
    for label in domain.split('.') {
        count += 1;
        let valid = !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return false;
        }
    }
    // 至少要有二级域名（即至少一个点）
    count >= 2
}

/// Display name: 2-50 characters of letters, digits, underscore, hyphen or
/// space.
pub fn validate_name(name: &str) -> Result<(), String> {
    let chars = name.chars().count();
    if !(2..=50).contains(&chars) {
        return Err("Name must be between 2 and 50 characters".to_string());
    }
    let allowed = name
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ' '));
    if !allowed {
        return Err(
            "Name may only contain letters, digits, underscores, hyphens and spaces".to_string(),
        );
    }
    Ok(())
}

/// The raw text a session is started from. Must carry something beyond
/// whitespace and fit the prompt budget.
pub fn validate_topic_input(input: &str) -> Result<(), String> {
    if input.trim().is_empty() {
        return Err("Topic input must not be empty".to_string());
    }
    if input.chars().count() > MAX_TOPIC_INPUT_CHARS {
        return Err(format!(
            "Topic input must be at most {MAX_TOPIC_INPUT_CHARS} characters"
        ));
    }
    Ok(())
}

/// Answers may be empty ("I don't know" is a valid submission) but are
/// length-capped like topic input.
pub fn validate_answer_input(answer: &str) -> Result<(), String> {
    if answer.chars().count() > MAX_ANSWER_INPUT_CHARS {
        return Err(format!(
            "Answer must be at most {MAX_ANSWER_INPUT_CHARS} characters"
        ));
    }
    Ok(())
}
