use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{StarError, StarResult};

/// 未指定分组时使用的默认分组
pub const DEFAULT_GROUP: &str = "main";
/// 未指定版本时使用的默认版本
pub const DEFAULT_VERSION: &str = "0";

const BRANCH_GROUP_MAX_LEN: usize = 16;

/// 服务版本号
///
/// 排序规则：点分数字段按数值比较，非数字段按字典序比较（数字段新于非数字段）；
/// 前缀相同时段数少的更旧；带 `-SNAPSHOT` 之类预发布后缀的版本旧于不带后缀的同一版本。
/// 以上都相同时按原始字符串兜底，保证这是一个严格全序。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(raw: impl Into<String>) -> Self {
        Version(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }

    fn split_qualifier(&self) -> (&str, Option<&str>) {
        match self.0.find('-') {
            Some(pos) => (&self.0[..pos], Some(&self.0[pos + 1..])),
            None => (&self.0, None),
        }
    }
}

fn compare_segment(left: &str, right: &str) -> Ordering {
    match (left.parse::<u64>(), right.parse::<u64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        (Ok(_), Err(_)) => Ordering::Greater,
        (Err(_), Ok(_)) => Ordering::Less,
        (Err(_), Err(_)) => left.cmp(right),
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (left_main, left_qualifier) = self.split_qualifier();
        let (right_main, right_qualifier) = other.split_qualifier();

        let mut left_segments = left_main.split('.');
        let mut right_segments = right_main.split('.');
        loop {
            let ordering = match (left_segments.next(), right_segments.next()) {
                (Some(l), Some(r)) => compare_segment(l, r),
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (None, None) => break,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        let qualifier_order = match (left_qualifier, right_qualifier) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(l), Some(r)) => l.cmp(r),
        };

        qualifier_order.then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 服务标识 `group/name/version`
///
/// 可以从多种原始输入解析：裸名称、`group/name/version`、`group_name_version`、
/// `name-version`，以及指向jar文件的路径（含jar内部的 `!/...` 路径）。
/// 构造后不可变，JSON中以 `group/name/version` 字符串表示。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceId {
    group: String,
    name: String,
    version: Version,
}

impl ServiceId {
    /// 从显式的三元组构造，各部分同样经过规范化
    pub fn new(group: &str, name: &str, version: &str) -> StarResult<Self> {
        Self::from_parts(Some(group), name, Some(version))
    }

    /// 解析原始字符串
    pub fn parse(raw: &str) -> StarResult<Self> {
        let input = strip_file_path(raw);
        if input.is_empty() {
            return Err(StarError::illegal_input(format!("无法解析服务标识: '{raw}'")));
        }

        if input.contains('/') {
            let parts: Vec<&str> = input.split('/').collect();
            match parts.as_slice() {
                [name] => Self::from_parts(None, name, None),
                [first, second] if starts_with_digit(second) => {
                    Self::from_parts(None, first, Some(second))
                }
                [group, name] => Self::from_parts(Some(group), name, None),
                [group, name, version] => Self::from_parts(Some(group), name, Some(version)),
                _ => Err(StarError::illegal_input(format!(
                    "服务标识包含过多的 '/' 分段: '{raw}'"
                ))),
            }
        } else {
            let (rest, version) = split_version(input);
            let (group, name) = split_group(rest);
            Self::from_parts(group, name, version)
        }
    }

    fn from_parts(group: Option<&str>, name: &str, version: Option<&str>) -> StarResult<Self> {
        let group = group
            .map(sanitize)
            .filter(|g| !is_blank(g))
            .unwrap_or_else(|| DEFAULT_GROUP.to_string());

        let name = sanitize(name);
        if is_blank(&name) {
            return Err(StarError::illegal_input("服务名称不能为空"));
        }

        let version = version
            .map(sanitize)
            .filter(|v| !is_blank(v))
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        Ok(Self {
            group,
            name,
            version: Version(version),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// 仅比较版本号
    pub fn is_newer_than(&self, other: &ServiceId) -> bool {
        self.version.is_newer_than(&other.version)
    }

    /// 是否与另一个标识属于同一个 (group, name)
    pub fn same_service(&self, other: &ServiceId) -> bool {
        self.group == other.group && self.name == other.name
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.name, self.version)
    }
}

impl std::str::FromStr for ServiceId {
    type Err = StarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceId::parse(s)
    }
}

impl TryFrom<String> for ServiceId {
    type Error = StarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ServiceId::parse(&value)
    }
}

impl From<ServiceId> for String {
    fn from(id: ServiceId) -> Self {
        id.to_string()
    }
}

/// 将VCS分支名截短为分组名
///
/// 优先取工单风格的前缀（如 `feature/ABC-123-login` → `ABC-123`），
/// 否则按 `-` 拆词并在长度上限内拼接。
pub fn branch_to_group_name(branch: &str) -> String {
    let segment = branch.trim().rsplit('/').next().unwrap_or_default();

    let group = match ticket_prefix(segment) {
        Some(ticket) => ticket.to_string(),
        None => {
            let mut group = String::new();
            for word in segment.split('-').filter(|w| !w.is_empty()) {
                let separator = usize::from(!group.is_empty());
                if group.len() + separator + word.len() > BRANCH_GROUP_MAX_LEN {
                    if group.is_empty() {
                        group = word.chars().take(BRANCH_GROUP_MAX_LEN).collect();
                    }
                    break;
                }
                if separator == 1 {
                    group.push('-');
                }
                group.push_str(word);
            }
            group
        }
    };

    let group = sanitize(&group);
    if is_blank(&group) || group == "master" || group == DEFAULT_GROUP {
        DEFAULT_GROUP.to_string()
    } else {
        group
    }
}

fn ticket_prefix(segment: &str) -> Option<&str> {
    let bytes = segment.as_bytes();
    let letters = bytes.iter().take_while(|b| b.is_ascii_alphabetic()).count();
    if letters == 0 || bytes.get(letters) != Some(&b'-') {
        return None;
    }
    let digits = bytes[letters + 1..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    Some(&segment[..letters + 1 + digits])
}

/// 去掉jar内部路径、目录和 `.jar` 后缀
///
/// 绝对路径（以 `/` 开头或含 `\`）只保留文件名，相对的 `a/b/c` 仍按分段解析。
fn strip_file_path(raw: &str) -> &str {
    let mut input = raw.trim();
    if let Some(pos) = input.find('!') {
        input = &input[..pos];
    }
    while input
        .len()
        .checked_sub(4)
        .and_then(|start| input.get(start..))
        .is_some_and(|suffix| suffix.eq_ignore_ascii_case(".jar"))
    {
        let file_name = input.rsplit(['/', '\\']).next().unwrap_or(input);
        input = &file_name[..file_name.len() - 4];
    }
    if input.starts_with('/') || input.contains('\\') {
        input = input.rsplit(['/', '\\']).next().unwrap_or(input);
    }
    input
}

/// 版本从第一个后面紧跟数字的 `_`/`-` 分隔符开始
fn split_version(input: &str) -> (&str, Option<&str>) {
    let bytes = input.as_bytes();
    let start = (0..bytes.len().saturating_sub(1))
        .find(|&i| matches!(bytes[i], b'_' | b'-') && bytes[i + 1].is_ascii_digit());
    match start {
        Some(pos) => (&input[..pos], Some(&input[pos + 1..])),
        None => (input, None),
    }
}

fn split_group(rest: &str) -> (Option<&str>, &str) {
    if let Some(pos) = rest.find("__") {
        (Some(&rest[..pos]), &rest[pos + 2..])
    } else if let Some(pos) = rest.find('_') {
        (Some(&rest[..pos]), &rest[pos + 1..])
    } else {
        (None, rest)
    }
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn is_blank(part: &str) -> bool {
    !part.chars().any(|c| c.is_ascii_alphanumeric())
}

fn starts_with_digit(part: &str) -> bool {
    part.as_bytes().first().is_some_and(u8::is_ascii_digit)
}
