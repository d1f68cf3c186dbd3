use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::OnceLock;

const MAX_DOMAIN_LEN: usize = 253;

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // 顶级域：字母，或 punycode（xn--）
        Regex::new(
            r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+(?:[a-z]{2,63}|xn--[a-z0-9](?:[a-z0-9-]{0,57}[a-z0-9])?)$",
        )
        .expect("valid domain regex")
    })
}

/// 规范化用户输入的域名：去掉协议、路径、端口和末尾的点，转小写
pub fn normalize_domain(input: &str) -> String {
    let mut d = input.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = d.strip_prefix(scheme) {
            d = rest.to_string();
        }
    }
    if let Some(pos) = d.find(['/', '?', '#']) {
        d.truncate(pos);
    }
    if let Some(pos) = d.find(':') {
        d.truncate(pos);
    }
    d.trim_end_matches('.').to_string()
}

/// 校验域名格式（已规范化）
pub fn validate_domain(domain: &str) -> AppResult<()> {
    if domain.is_empty() {
        return Err(AppError::ValidationError("Domain is required".into()));
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(AppError::ValidationError(format!(
            "Domain must be at most {MAX_DOMAIN_LEN} characters"
        )));
    }
    if !domain_regex().is_match(domain) {
        return Err(AppError::ValidationError(format!(
            "Invalid domain format: {domain}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  Rifas.Example.COM. "), "rifas.example.com");
        assert_eq!(
            normalize_domain("https://www.example.com/path?q=1"),
            "www.example.com"
        );
        assert_eq!(normalize_domain("example.com:8080"), "example.com");
    }

    #[test]
    fn test_valid_domains() {
        for d in [
            "example.com",
            "sorteos.mi-negocio.mx",
            "a.b.c.d.io",
            "x1.co",
            "xn--80ak6aa92e.xn--p1ai",
            "rifas.xn--fiqs8s",
        ] {
            assert!(validate_domain(d).is_ok(), "{d} should be valid");
        }
    }

    #[test]
    fn test_invalid_domains() {
        for d in [
            "",
            "localhost",
            "-bad.com",
            "bad-.com",
            "under_score.com",
            "example.c",
            "exa mple.com",
            "example.123",
            "example.xn--",
            "example.xn--p1ai-",
        ] {
            assert!(validate_domain(d).is_err(), "{d} should be invalid");
        }
    }

    #[test]
    fn test_label_and_total_length_limits() {
        let label63 = "a".repeat(63);
        assert!(validate_domain(&format!("{label63}.com")).is_ok());
        let label64 = "a".repeat(64);
        assert!(validate_domain(&format!("{label64}.com")).is_err());

        let long = format!("{}.com", vec!["abcdefghi"; 26].join("."));
        assert!(long.len() > MAX_DOMAIN_LEN);
        assert!(validate_domain(&long).is_err());
    }
}
