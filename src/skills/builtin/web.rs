//! web_fetch：域名白名单、超时、结果截断
//!
//! URL 用 reqwest::Url 解析，带用户信息的 URL 直接拒绝；不跟随重定向。
//! GET 请求带超时与 User-Agent；HTML 响应用 html2text 提取可读文本；
//! 超过 max_chars 时截断并追加 ...[truncated]。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::{redirect, Client, Url};

use crate::skills::{
    CostTier, ParamType, RiskTier, SkillBinding, SkillCategory, SkillDescriptor, SkillInputs,
    SkillResult, TrustLevel,
};

const USER_AGENT: &str = concat!("cortex/", env!("CARGO_PKG_VERSION"));

/// 解析 http(s) URL，返回实际连接的 host（小写）
fn target_host(url: &str) -> Result<String, String> {
    let parsed = Url::parse(url.trim()).map_err(|e| format!("Invalid URL: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(format!("Unsupported URL scheme: {}", parsed.scheme()));
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err("URLs with credentials are not allowed".to_string());
    }
    parsed
        .host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| "URL has no host".to_string())
}

fn extract_domain(url: &str) -> Option<String> {
    target_host(url).ok()
}

fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.contains("</") && (s.contains("<head") || s.contains("<body")))
}

pub fn web_fetch_descriptor() -> SkillDescriptor {
    SkillDescriptor::new("web_fetch", SkillCategory::Network)
        .with_name("Fetch web page")
        .with_description("Fetch the readable text of a URL on an allowed domain.")
        .input("url", ParamType::String, true, "http(s) URL")
        .validate_with("url", |v| match v.as_str().and_then(extract_domain) {
            Some(_) => Ok(()),
            None => Err("must be an http(s) URL".to_string()),
        })
        .output("text", ParamType::String)
        .output("url", ParamType::String)
        .with_risk(RiskTier::Medium)
        .with_cost(CostTier::Cheap)
        .with_min_trust(TrustLevel::Suggest)
}

pub struct WebFetchSkill {
    client: Client,
    allowed_domains: HashSet<String>,
    max_chars: usize,
}

impl WebFetchSkill {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains.into_iter().map(|d| d.to_lowercase()).collect(),
            max_chars,
        }
    }

    fn check_domain(&self, url: &str) -> Result<(), String> {
        let domain = target_host(url)?;
        if self.allowed_domains.contains(&domain) {
            Ok(())
        } else {
            Err(format!("Domain not in allowlist: {}", domain))
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        self.check_domain(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed (network): {}", e))?;
        if resp.status().is_redirection() {
            return Err(format!(
                "HTTP {}: redirect not followed",
                resp.status().as_u16()
            ));
        }
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status().as_u16()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        let body = body.trim_start_matches('\u{FEFF}');
        let text = if looks_like_html(body) {
            from_read(body.as_bytes(), 120).unwrap_or_else(|_| body.to_string())
        } else {
            body.to_string()
        };
        if text.chars().count() > self.max_chars {
            Ok(text.chars().take(self.max_chars).collect::<String>() + "\n...[truncated]")
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl SkillBinding for WebFetchSkill {
    async fn invoke(&self, inputs: SkillInputs) -> SkillResult {
        let url = inputs.get("url").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
        tracing::info!(url = %url, "web_fetch");
        match self.fetch(&url).await {
            Ok(text) => {
                let mut out = SkillInputs::new();
                out.insert("text".into(), text.into());
                out.insert("url".into(), url.into());
                SkillResult::ok(out)
            }
            Err(e) => SkillResult::failure(e),
        }
    }
}
