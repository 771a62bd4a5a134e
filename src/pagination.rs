use axum::http::Uri;
use serde::Serialize;

use crate::config::PaginationConfig;
use crate::error::{ApiError, ApiResult};
use crate::query::QueryPairs;

const PAGE_PARAM: &str = "page";
const LIMIT_PARAM: &str = "limit";

/// `page` / `limit` query parameters after defaults and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: i64,
    pub limit: i64,
}

impl PageParams {
    pub fn from_query(q: &QueryPairs, cfg: &PaginationConfig) -> ApiResult<Self> {
        let page = match q.get(PAGE_PARAM) {
            None => 1,
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(invalid_page)?,
        };
        // A bad limit falls back to the default instead of failing the request.
        let limit = q
            .get(LIMIT_PARAM)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|l| *l > 0)
            .map(|l| l.min(cfg.max_page_size))
            .unwrap_or(cfg.page_size);
        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn page_count(&self, total: i64) -> i64 {
        ((total + self.limit - 1) / self.limit).max(1)
    }

    /// Page 1 always exists; anything past the last page is a 404.
    pub fn ensure_in_range(&self, total: i64) -> ApiResult<()> {
        if self.page > self.page_count(total) {
            return Err(invalid_page());
        }
        Ok(())
    }
}

fn invalid_page() -> ApiError {
    ApiError::NotFound("Invalid page.".into())
}

/// Builds absolute links to neighbouring pages of the current request.
#[derive(Debug, Clone)]
pub struct PageLinks {
    path: String,
    segments: Vec<String>,
}

impl PageLinks {
    pub fn new(base_url: &str, uri: &Uri) -> Self {
        let segments = uri
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|s| !s.is_empty())
            .filter(|s| s.split('=').next() != Some(PAGE_PARAM))
            .map(str::to_string)
            .collect();
        Self {
            path: format!("{}{}", base_url.trim_end_matches('/'), uri.path()),
            segments,
        }
    }

    /// Link to `page`; page 1 is expressed by dropping the parameter.
    pub fn to_page(&self, page: i64) -> String {
        let mut segments = self.segments.clone();
        if page > 1 {
            segments.push(format!("{PAGE_PARAM}={page}"));
        }
        if segments.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, segments.join("&"))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, params: PageParams, links: &PageLinks) -> Self {
        let next = (params.page < params.page_count(count)).then(|| links.to_page(params.page + 1));
        let previous = (params.page > 1).then(|| links.to_page(params.page - 1));
        Self {
            count,
            next,
            previous,
            results,
        }
    }

    pub fn empty(params: PageParams, links: &PageLinks) -> Self {
        Self::new(Vec::new(), 0, params, links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PaginationConfig {
        PaginationConfig {
            page_size: 6,
            max_page_size: 50,
        }
    }

    #[test]
    fn defaults_when_absent() {
        let p = PageParams::from_query(&QueryPairs::default(), &cfg()).unwrap();
        assert_eq!(p, PageParams { page: 1, limit: 6 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn limit_is_clamped_and_bad_limit_ignored() {
        let p = PageParams::from_query(&QueryPairs::from([("limit", "500")]), &cfg()).unwrap();
        assert_eq!(p.limit, 50);
        let p = PageParams::from_query(&QueryPairs::from([("limit", "abc")]), &cfg()).unwrap();
        assert_eq!(p.limit, 6);
        let p = PageParams::from_query(&QueryPairs::from([("limit", "0")]), &cfg()).unwrap();
        assert_eq!(p.limit, 6);
    }

    #[test]
    fn bad_page_is_not_found() {
        for raw in ["0", "-2", "two"] {
            let err = PageParams::from_query(&QueryPairs::from([("page", raw)]), &cfg()).unwrap_err();
            assert!(matches!(err, ApiError::NotFound(_)), "page={raw}");
        }
    }

    #[test]
    fn page_range_check() {
        let p = PageParams { page: 1, limit: 6 };
        assert!(p.ensure_in_range(0).is_ok());
        let p = PageParams { page: 3, limit: 6 };
        assert!(p.ensure_in_range(13).is_ok());
        assert!(p.ensure_in_range(12).is_err());
    }

    #[test]
    fn links_preserve_other_params() {
        let uri: Uri = "/api/recipes?tags=lunch&page=2&limit=2".parse().unwrap();
        let links = PageLinks::new("http://testserver", &uri);
        let page = Page::new(vec![1, 2], 5, PageParams { page: 2, limit: 2 }, &links);
        assert_eq!(
            page.next.as_deref(),
            Some("http://testserver/api/recipes?tags=lunch&limit=2&page=3")
        );
        assert_eq!(
            page.previous.as_deref(),
            Some("http://testserver/api/recipes?tags=lunch&limit=2")
        );
    }

    #[test]
    fn single_page_has_no_links() {
        let uri: Uri = "/api/users".parse().unwrap();
        let links = PageLinks::new("http://testserver/", &uri);
        let page: Page<u8> = Page::empty(PageParams { page: 1, limit: 6 }, &links);
        assert_eq!(page.count, 0);
        assert!(page.next.is_none());
        assert!(page.previous.is_none());
        assert_eq!(links.to_page(1), "http://testserver/api/users");
    }
}
