//! 选择器与候选列表
//!
//! 候选列表是纯配置数据：同一个控件的多种定位方式，按偏好排序。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 单个选择器表达式
///
/// 字符串写法：
/// - `xpath:...`，或以 `/`、`./`、`(` 开头 → XPath
/// - `css:...`，或其他任意字符串 → CSS
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    XPath(String),
    Css(String),
}

impl Selector {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Selector::XPath(expr.into())
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Selector::Css(expr.into())
    }

    /// 不带前缀的表达式本身
    pub fn expression(&self) -> &str {
        match self {
            Selector::XPath(e) | Selector::Css(e) => e,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Selector::XPath(_) => "xpath",
            Selector::Css(_) => "css",
        }
    }
}

impl FromStr for Selector {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err("选择器不能为空".to_string());
        }
        if let Some(rest) = raw.strip_prefix("xpath:") {
            return Ok(Selector::xpath(rest.trim()));
        }
        if let Some(rest) = raw.strip_prefix("css:") {
            return Ok(Selector::css(rest.trim()));
        }
        if raw.starts_with('/') || raw.starts_with("./") || raw.starts_with('(') {
            Ok(Selector::xpath(raw))
        } else {
            Ok(Selector::css(raw))
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::XPath(e) => write!(f, "{}", e),
            Selector::Css(e) => write!(f, "css:{}", e),
        }
    }
}

/// 一个控件的候选选择器列表（有序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct SelectorCandidate {
    selectors: Vec<Selector>,
}

impl SelectorCandidate {
    pub fn new(selectors: Vec<Selector>) -> Self {
        Self { selectors }
    }

    /// 从字符串列表构造，非法项会让整个列表失败
    pub fn parse<I, S>(raw: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selectors = raw
            .into_iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Selector>, String>>()?;
        Ok(Self { selectors })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selector> {
        self.selectors.iter()
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// 日志用的简短描述
    pub fn describe(&self) -> String {
        match self.selectors.first() {
            Some(first) if self.selectors.len() > 1 => {
                format!("{} (+{} 个备选)", first, self.selectors.len() - 1)
            }
            Some(first) => first.to_string(),
            None => "<空>".to_string(),
        }
    }
}

impl TryFrom<Vec<String>> for SelectorCandidate {
    type Error = String;

    fn try_from(raw: Vec<String>) -> Result<Self, Self::Error> {
        SelectorCandidate::parse(raw)
    }
}

impl From<SelectorCandidate> for Vec<String> {
    fn from(candidate: SelectorCandidate) -> Self {
        candidate.selectors.iter().map(|s| s.to_string()).collect()
    }
}

/// 便捷宏风格的构造：`candidates(&["//button", "css:.x"])`
pub fn candidates(raw: &[&str]) -> SelectorCandidate {
    SelectorCandidate::new(
        raw.iter()
            .filter_map(|s| s.parse::<Selector>().ok())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xpath_and_css_forms() {
        assert_eq!(
            "//input[@type='url']".parse::<Selector>().unwrap(),
            Selector::xpath("//input[@type='url']")
        );
        assert_eq!(
            ".//button".parse::<Selector>().unwrap(),
            Selector::xpath(".//button")
        );
        assert_eq!(
            "(//div[@class='x'])[2]".parse::<Selector>().unwrap(),
            Selector::xpath("(//div[@class='x'])[2]")
        );
        assert_eq!(
            "css:button.primary".parse::<Selector>().unwrap(),
            Selector::css("button.primary")
        );
        assert_eq!(
            "input[type=email]".parse::<Selector>().unwrap(),
            Selector::css("input[type=email]")
        );
        assert!("   ".parse::<Selector>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for raw in ["//a[@href]", "css:div > span", "xpath://b"] {
            let sel: Selector = raw.parse().unwrap();
            let again: Selector = sel.to_string().parse().unwrap();
            assert_eq!(sel, again);
        }
    }

    #[test]
    fn candidate_deserializes_from_string_list() {
        #[derive(Deserialize)]
        struct Table {
            submit: SelectorCandidate,
        }
        let table: Table =
            toml::from_str(r#"submit = ["//button[@type='submit']", "css:button.go"]"#).unwrap();
        assert_eq!(table.submit.len(), 2);
        assert_eq!(
            table.submit.iter().nth(1),
            Some(&Selector::css("button.go"))
        );
    }

    #[test]
    fn candidate_rejects_empty_entries() {
        assert!(SelectorCandidate::parse(["//ok", ""]).is_err());
    }
}
