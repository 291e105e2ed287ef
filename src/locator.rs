use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    Css,
    XPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub kind: LocatorKind,
    pub query: String,
}

impl Locator {
    pub fn css(query: impl Into<String>) -> Self {
        Self {
            kind: LocatorKind::Css,
            query: query.into(),
        }
    }

    pub fn xpath(query: impl Into<String>) -> Self {
        Self {
            kind: LocatorKind::XPath,
            query: query.into(),
        }
    }

    pub fn tag_with_text(tag: &str, text: &str) -> Self {
        Self::xpath(format!("//{tag}[contains(text(), '{text}')]"))
    }

    pub fn aria_label(tag: &str, label: &str) -> Self {
        Self::css(format!("{tag}[aria-label*='{label}']"))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LocatorKind::Css => write!(f, "css:{}", self.query),
            LocatorKind::XPath => write!(f, "xpath:{}", self.query),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub u64);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
