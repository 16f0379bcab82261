//! Pagination markup.

use crate::view::html_escape;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLinkKind {
    Previous,
    Page(usize),
    Gap,
    Next,
}

/// One entry of a pagination bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub kind: PageLinkKind,
    /// Javascript call loading the page; `None` when the link is disabled.
    pub call: Option<String>,
    pub active: bool,
}

impl PageLink {
    pub fn previous(call: Option<String>) -> Self {
        Self {
            kind: PageLinkKind::Previous,
            call,
            active: false,
        }
    }

    pub fn next(call: Option<String>) -> Self {
        Self {
            kind: PageLinkKind::Next,
            call,
            active: false,
        }
    }

    pub fn page(number: usize, call: String, active: bool) -> Self {
        Self {
            kind: PageLinkKind::Page(number),
            call: Some(call),
            active,
        }
    }

    pub fn gap() -> Self {
        Self {
            kind: PageLinkKind::Gap,
            call: None,
            active: false,
        }
    }

    fn label(&self) -> String {
        match self.kind {
            PageLinkKind::Previous => "&laquo;".to_string(),
            PageLinkKind::Next => "&raquo;".to_string(),
            PageLinkKind::Gap => "&hellip;".to_string(),
            PageLinkKind::Page(number) => number.to_string(),
        }
    }
}

/// Turns page links into markup.
pub trait PaginationRenderer {
    fn render(&self, links: &[PageLink]) -> String;
}

/// Renders a `<ul class="pagination">` list.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPaginationRenderer;

impl PaginationRenderer for DefaultPaginationRenderer {
    fn render(&self, links: &[PageLink]) -> String {
        let mut html = String::from(r#"<ul class="pagination">"#);
        for link in links {
            let class = if link.active {
                "active"
            } else if link.call.is_none() {
                "disabled"
            } else {
                ""
            };
            if class.is_empty() {
                html.push_str("<li>");
            } else {
                html.push_str(&format!(r#"<li class="{}">"#, class));
            }
            match (&link.call, link.active) {
                (Some(call), false) => html.push_str(&format!(
                    r#"<a href="javascript:;" onclick="{};return false;">{}</a>"#,
                    html_escape(call),
                    link.label()
                )),
                _ => html.push_str(&format!("<span>{}</span>", link.label())),
            }
            html.push_str("</li>");
        }
        html.push_str("</ul>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_renderer() {
        let links = vec![
            PageLink::previous(None),
            PageLink::page(1, "Users.list(1)".to_string(), true),
            PageLink::page(2, r#"Users.list(2, "a")"#.to_string(), false),
            PageLink::next(Some("Users.list(2)".to_string())),
        ];
        let html = DefaultPaginationRenderer.render(&links);
        assert_eq!(
            html,
            concat!(
                r#"<ul class="pagination">"#,
                r#"<li class="disabled"><span>&laquo;</span></li>"#,
                r#"<li class="active"><span>1</span></li>"#,
                r#"<li><a href="javascript:;" onclick="Users.list(2, &quot;a&quot;);return false;">2</a></li>"#,
                r#"<li><a href="javascript:;" onclick="Users.list(2);return false;">&raquo;</a></li>"#,
                "</ul>"
            )
        );
    }
}
