use std::collections::BTreeMap;
use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::errors::{StarError, StarResult};

/// `star` 取此值时表示只在本地star内中继
pub const LOCAL_STAR: &str = "@local";
/// 保留服务名，解析为Dispatcher自身（MiniBus跨star转发使用）
pub const DISPATCHER_SERVICE: &str = "@dispatcher";

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

/// 中继请求使用的HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl RelayMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayMethod::Get => "GET",
            RelayMethod::Post => "POST",
            RelayMethod::Put => "PUT",
            RelayMethod::Patch => "PATCH",
            RelayMethod::Delete => "DELETE",
            RelayMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for RelayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// 中继请求：“调用服务X”的逻辑描述，由 [`RelayRequestBuilder`] 构造，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    #[serde(default)]
    method: RelayMethod,
    service_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    service_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    star: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_token: Option<String>,
    #[serde(default = "default_true")]
    include_local_star: bool,
    #[serde(default)]
    binary: bool,
    #[serde(default)]
    params: BTreeMap<String, String>,
}

impl RelayRequest {
    pub fn builder(service_name: impl Into<String>) -> RelayRequestBuilder {
        RelayRequestBuilder::new(service_name)
    }

    pub fn method(&self) -> RelayMethod {
        self.method
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_path(&self) -> Option<&str> {
        self.service_path.as_deref()
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn star(&self) -> Option<&str> {
        self.star.as_deref()
    }

    pub fn user_token(&self) -> Option<&str> {
        self.user_token.as_deref()
    }

    pub fn include_local_star(&self) -> bool {
        self.include_local_star
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn is_local_only(&self) -> bool {
        self.star.as_deref() == Some(LOCAL_STAR)
    }

    /// 请求体字节；二进制请求的payload是base64文本
    pub fn payload_bytes(&self) -> StarResult<Option<Vec<u8>>> {
        match (&self.payload, self.binary) {
            (None, _) => Ok(None),
            (Some(text), false) => Ok(Some(text.clone().into_bytes())),
            (Some(encoded), true) => general_purpose::STANDARD
                .decode(encoded)
                .map(Some)
                .map_err(|e| StarError::illegal_input(format!("二进制payload不是合法的base64: {e}"))),
        }
    }

    /// 校验必填字段；反序列化得到的请求同样要经过校验
    pub fn validate(&self) -> StarResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(StarError::illegal_input("中继目标服务名不能为空"));
        }
        if self.star.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(StarError::illegal_input("中继目标star名不能为空"));
        }
        Ok(())
    }

    /// 固定到某个star的副本，用于跨star转发，对端不会再扇出
    pub fn pinned_to(&self, star: &str) -> RelayRequest {
        RelayRequest {
            star: Some(star.to_string()),
            include_local_star: true,
            ..self.clone()
        }
    }

    /// 附带用户令牌的副本
    pub fn with_user_token(&self, token: Option<String>) -> RelayRequest {
        RelayRequest {
            user_token: token,
            ..self.clone()
        }
    }
}

/// [`RelayRequest`] 的流式构造器
#[derive(Debug, Clone)]
pub struct RelayRequestBuilder {
    request: RelayRequest,
}

impl RelayRequestBuilder {
    fn new(service_name: impl Into<String>) -> Self {
        Self {
            request: RelayRequest {
                method: RelayMethod::Get,
                service_name: service_name.into(),
                service_path: None,
                payload: None,
                star: None,
                user_token: None,
                include_local_star: true,
                binary: false,
                params: BTreeMap::new(),
            },
        }
    }

    pub fn method(mut self, method: RelayMethod) -> Self {
        self.request.method = method;
        self
    }

    pub fn service_path(mut self, path: impl Into<String>) -> Self {
        self.request.service_path = Some(path.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.request.payload = Some(payload.into());
        self.request.binary = false;
        self
    }

    pub fn binary_payload(mut self, payload: &[u8]) -> Self {
        self.request.payload = Some(general_purpose::STANDARD.encode(payload));
        self.request.binary = true;
        self
    }

    /// 标记payload与响应体都以base64传输
    pub fn binary(mut self, binary: bool) -> Self {
        self.request.binary = binary;
        self
    }

    pub fn star(mut self, star: impl Into<String>) -> Self {
        self.request.star = Some(star.into());
        self
    }

    pub fn local_only(self) -> Self {
        self.star(LOCAL_STAR)
    }

    pub fn user_token(mut self, token: impl Into<String>) -> Self {
        self.request.user_token = Some(token.into());
        self
    }

    pub fn include_local_star(mut self, include: bool) -> Self {
        self.request.include_local_star = include;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> StarResult<RelayRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}

fn default_status() -> u16 {
    STATUS_OK
}

/// 单个star的中继结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse<T> {
    star_name: String,
    star_url: String,
    #[serde(default = "default_status")]
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<T>,
}

impl<T> RelayResponse<T> {
    pub fn builder() -> RelayResponseBuilder<T> {
        RelayResponseBuilder {
            star_name: None,
            star_url: None,
            status: STATUS_OK,
            content: None,
        }
    }

    /// 没有内容的失败结果
    pub fn failure(star_name: impl Into<String>, star_url: impl Into<String>, status: u16) -> Self {
        Self {
            star_name: star_name.into(),
            star_url: star_url.into(),
            status,
            content: None,
        }
    }

    /// 目标未应答时的结果
    pub fn unavailable(star_name: impl Into<String>, star_url: impl Into<String>) -> Self {
        Self::failure(star_name, star_url, STATUS_SERVICE_UNAVAILABLE)
    }

    pub fn star_name(&self) -> &str {
        &self.star_name
    }

    pub fn star_url(&self) -> &str {
        &self.star_url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<T> {
        self.content
    }

    /// 换成另一个star名称和地址
    pub fn with_star(self, star_name: impl Into<String>, star_url: impl Into<String>) -> Self {
        Self {
            star_name: star_name.into(),
            star_url: star_url.into(),
            ..self
        }
    }

    pub fn map_content<U>(self, f: impl FnOnce(T) -> U) -> RelayResponse<U> {
        RelayResponse {
            star_name: self.star_name,
            star_url: self.star_url,
            status: self.status,
            content: self.content.map(f),
        }
    }
}

impl RelayResponse<String> {
    /// 把文本内容按JSON解码为具体类型
    pub fn decode<U: DeserializeOwned>(self) -> StarResult<RelayResponse<U>> {
        let content = match self.content {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };
        Ok(RelayResponse {
            star_name: self.star_name,
            star_url: self.star_url,
            status: self.status,
            content,
        })
    }
}

/// [`RelayResponse`] 构造器，star名与地址必填
#[derive(Debug, Clone)]
pub struct RelayResponseBuilder<T> {
    star_name: Option<String>,
    star_url: Option<String>,
    status: u16,
    content: Option<T>,
}

impl<T> RelayResponseBuilder<T> {
    pub fn star_name(mut self, name: impl Into<String>) -> Self {
        self.star_name = Some(name.into());
        self
    }

    pub fn star_url(mut self, url: impl Into<String>) -> Self {
        self.star_url = Some(url.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn content(mut self, content: T) -> Self {
        self.content = Some(content);
        self
    }

    pub fn build(self) -> StarResult<RelayResponse<T>> {
        let star_name = self
            .star_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| StarError::illegal_input("RelayResponse缺少star名称"))?;
        let star_url = self
            .star_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| StarError::illegal_input("RelayResponse缺少star地址"))?;
        Ok(RelayResponse {
            star_name,
            star_url,
            status: self.status,
            content: self.content,
        })
    }
}
