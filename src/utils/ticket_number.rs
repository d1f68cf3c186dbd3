use crate::error::{AppError, AppResult};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const MAX_PAD_WIDTH: u32 = 20;
const MAX_AFFIX_LEN: usize = 20;

/// 票号格式配置（存储在 raffles.numbering JSONB 列）
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(default)]
pub struct NumberingConfig {
    pub start_number: i64,
    pub step: i64,
    pub pad_enabled: bool,
    pub pad_width: u32,
    #[schema(value_type = String, example = "0")]
    pub pad_char: char,
    pub prefix: String,
    pub suffix: String,
    pub separator: String,
}

impl Default for NumberingConfig {
    fn default() -> Self {
        Self {
            start_number: 1,
            step: 1,
            pad_enabled: true,
            pad_width: 1,
            pad_char: '0',
            prefix: String::new(),
            suffix: String::new(),
            separator: String::new(),
        }
    }
}

impl NumberingConfig {
    /// 默认配置：补零到最后一个号码的位数
    pub fn default_for(total_tickets: i64) -> Self {
        let mut cfg = Self::default();
        cfg.pad_width = cfg.width_for(total_tickets);
        cfg
    }

    /// 最大号码的十进制位数
    pub fn width_for(&self, total_tickets: i64) -> u32 {
        let last = self.number_at(total_tickets.saturating_sub(1).max(0));
        last.to_string().len() as u32
    }

    pub fn number_at(&self, index: i64) -> i64 {
        self.start_number
            .saturating_add(index.saturating_mul(self.step))
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.step < 1 {
            return Err(AppError::ValidationError(
                "Numbering step must be at least 1".into(),
            ));
        }
        if self.start_number < 0 {
            return Err(AppError::ValidationError(
                "Numbering start must not be negative".into(),
            ));
        }
        if self.pad_width > MAX_PAD_WIDTH {
            return Err(AppError::ValidationError(format!(
                "Padding width must be at most {MAX_PAD_WIDTH}"
            )));
        }
        if self.prefix.chars().count() > MAX_AFFIX_LEN
            || self.suffix.chars().count() > MAX_AFFIX_LEN
            || self.separator.chars().count() > MAX_AFFIX_LEN
        {
            return Err(AppError::ValidationError(format!(
                "Prefix, suffix and separator must be at most {MAX_AFFIX_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// 格式化票号: prefix + separator + padded(start + index*step) + suffix
pub fn format_ticket_number(config: &NumberingConfig, index: i64) -> String {
    let number = config.number_at(index).to_string();
    let width = config.pad_width as usize;

    let padded = if config.pad_enabled && number.len() < width {
        let mut s: String = std::iter::repeat(config.pad_char)
            .take(width - number.len())
            .collect();
        s.push_str(&number);
        s
    } else {
        number
    };

    let mut out = String::with_capacity(
        config.prefix.len() + config.separator.len() + padded.len() + config.suffix.len(),
    );
    out.push_str(&config.prefix);
    out.push_str(&config.separator);
    out.push_str(&padded);
    out.push_str(&config.suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NumberingConfig {
        NumberingConfig {
            start_number: 0,
            step: 1,
            pad_enabled: true,
            pad_width: 4,
            pad_char: '0',
            prefix: String::new(),
            suffix: String::new(),
            separator: String::new(),
        }
    }

    #[test]
    fn test_plain_padding() {
        assert_eq!(format_ticket_number(&cfg(), 0), "0000");
        assert_eq!(format_ticket_number(&cfg(), 42), "0042");
        assert_eq!(format_ticket_number(&cfg(), 9999), "9999");
    }

    #[test]
    fn test_longer_number_is_not_truncated() {
        assert_eq!(format_ticket_number(&cfg(), 123_456), "123456");
    }

    #[test]
    fn test_prefix_separator_suffix_and_step() {
        let c = NumberingConfig {
            start_number: 100,
            step: 5,
            pad_width: 5,
            pad_char: '*',
            prefix: "RIFA".into(),
            separator: "-".into(),
            suffix: "X".into(),
            ..cfg()
        };
        // 100 + 3*5 = 115
        assert_eq!(format_ticket_number(&c, 3), "RIFA-**115X");
    }

    #[test]
    fn test_separator_is_kept_without_prefix() {
        let c = NumberingConfig {
            separator: "#".into(),
            ..cfg()
        };
        assert_eq!(format_ticket_number(&c, 7), "#0007");
    }

    #[test]
    fn test_padding_disabled() {
        let c = NumberingConfig {
            pad_enabled: false,
            ..cfg()
        };
        assert_eq!(format_ticket_number(&c, 7), "7");
    }

    #[test]
    fn test_total_and_deterministic_over_all_indices() {
        let c = NumberingConfig {
            start_number: 1,
            step: 3,
            pad_width: 6,
            prefix: "A".into(),
            ..cfg()
        };
        for i in 0..2_000 {
            let first = format_ticket_number(&c, i);
            let second = format_ticket_number(&c, i);
            assert_eq!(first, second);
            let n = c.number_at(i);
            let padded = format!("{n:0>6}");
            assert!(first.contains(&padded), "{first} should contain {padded}");
        }
    }

    #[test]
    fn test_extreme_values_do_not_panic() {
        let c = NumberingConfig {
            start_number: i64::MAX - 1,
            step: i64::MAX,
            ..cfg()
        };
        let s = format_ticket_number(&c, i64::MAX);
        assert_eq!(s, i64::MAX.to_string());
    }

    #[test]
    fn test_default_for_pads_to_last_number() {
        let c = NumberingConfig::default_for(1000);
        // 最后一个号码是 1000 (start 1)
        assert_eq!(c.pad_width, 4);
        assert_eq!(format_ticket_number(&c, 0), "0001");
        assert_eq!(format_ticket_number(&c, 999), "1000");
    }

    #[test]
    fn test_validate() {
        assert!(cfg().validate().is_ok());
        assert!(NumberingConfig { step: 0, ..cfg() }.validate().is_err());
        assert!(NumberingConfig { start_number: -1, ..cfg() }.validate().is_err());
        assert!(NumberingConfig { pad_width: 21, ..cfg() }.validate().is_err());
        assert!(
            NumberingConfig {
                prefix: "P".repeat(21),
                ..cfg()
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let c: NumberingConfig = serde_json::from_str(r#"{"prefix":"N","pad_width":3}"#).unwrap();
        assert_eq!(c.start_number, 1);
        assert_eq!(c.pad_char, '0');
        assert_eq!(format_ticket_number(&c, 4), "N005");
    }
}
