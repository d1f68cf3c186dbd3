use crate::config::DnsConfig;
use crate::error::{AppError, AppResult};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// DNS 记录类型编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    A,
    Cname,
}

impl RecordType {
    fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Cname => 5,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Cname => "CNAME",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DohResponse {
    #[serde(rename = "Status")]
    pub status: u16,
    #[serde(rename = "Answer", default)]
    pub answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct DohAnswer {
    #[serde(rename = "type")]
    pub record_type: u16,
    pub data: String,
}

/// 从应答中取出指定类型的记录；CNAME 去掉末尾的点并转小写
pub fn extract_records(resp: &DohResponse, rtype: RecordType) -> Vec<String> {
    let mut out: Vec<String> = resp
        .answer
        .iter()
        .filter(|a| a.record_type == rtype.code())
        .map(|a| a.data.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// DNS-over-HTTPS (JSON) 解析
#[derive(Clone)]
pub struct DohResolver {
    http: Client,
    cfg: DnsConfig,
}

impl DohResolver {
    pub fn new(cfg: DnsConfig) -> Self {
        let http = Client::builder()
            .user_agent("sorteos-backend/dns")
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { http, cfg }
    }

    pub async fn resolve(&self, name: &str, rtype: RecordType) -> AppResult<Vec<String>> {
        let resp = self
            .http
            .get(&self.cfg.doh_url)
            .header("accept", "application/dns-json")
            .query(&[("name", name), ("type", rtype.name())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "DNS lookup for {name} failed: HTTP {}",
                status.as_u16()
            )));
        }
        let body: DohResponse = resp.json().await?;
        // 3 = NXDOMAIN，视为无记录
        if body.status != 0 && body.status != 3 {
            return Err(AppError::ExternalApiError(format!(
                "DNS lookup for {name} returned status {}",
                body.status
            )));
        }
        Ok(extract_records(&body, rtype))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_records_filters_by_type() {
        let raw = r#"{
            "Status": 0,
            "Answer": [
                {"name": "www.example.com.", "type": 5, "TTL": 300, "data": "CNAME.Vercel-DNS.com."},
                {"name": "cname.vercel-dns.com.", "type": 1, "TTL": 300, "data": "76.76.21.21"},
                {"name": "cname.vercel-dns.com.", "type": 1, "TTL": 300, "data": "76.76.21.21"}
            ]
        }"#;
        let resp: DohResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_records(&resp, RecordType::A), vec!["76.76.21.21"]);
        assert_eq!(
            extract_records(&resp, RecordType::Cname),
            vec!["cname.vercel-dns.com"]
        );
    }

    #[test]
    fn test_missing_answer_section() {
        let resp: DohResponse = serde_json::from_str(r#"{"Status": 3}"#).unwrap();
        assert!(extract_records(&resp, RecordType::A).is_empty());
    }
}
