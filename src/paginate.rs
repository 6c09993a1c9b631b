use tracing::debug;

use crate::domain::Endpoint;
use crate::error::GdcError;
use crate::filters::{QueryOptions, SearchQuery, build_query_params};
use crate::http::GdcHttp;
use crate::settings::Settings;

/// Start position for a page, using the remote API's 1-indexed `from`
/// convention.
pub fn compute_offset(page: usize, size: usize) -> usize {
    page * size + 1
}

/// Total number of pages a query will produce.
///
/// With an explicit item cap the count is pure arithmetic; otherwise a
/// zero-offset query is issued and the remote-reported page count read
/// back.
pub fn count_pages<H: GdcHttp>(
    http: &H,
    settings: &Settings,
    query: &SearchQuery,
    endpoint: Endpoint,
    size: usize,
    item_cap: Option<usize>,
) -> Result<usize, GdcError> {
    if let Some(cap) = item_cap {
        if size >= cap {
            return Ok(1);
        }
        return Ok(cap / size.max(1) + 1);
    }

    let options = QueryOptions {
        size: Some(size),
        ..QueryOptions::default()
    };
    let params = build_query_params(query.filter()?.as_ref(), &options);
    let url = settings.endpoint_url(endpoint);
    let response = http.get(&url, params.as_slice())?.error_for_status()?;
    let json = response.json()?;
    let pages = json
        .pointer("/data/pagination/pages")
        .and_then(|value| value.as_u64())
        .ok_or_else(|| GdcError::ResultParse("missing data.pagination.pages".to_string()))?;
    debug!(pages, "remote-reported page count");
    Ok(pages as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpResponse;

    struct UnreachableHttp;

    impl GdcHttp for UnreachableHttp {
        fn get(&self, _url: &str, _params: &[(String, String)]) -> Result<HttpResponse, GdcError> {
            panic!("no request expected for capped page counts")
        }
    }

    #[test]
    fn offset_is_one_indexed() {
        assert_eq!(compute_offset(0, 10), 1);
        assert_eq!(compute_offset(2, 5), 11);
        assert_eq!(compute_offset(3, 0), 1);
    }

    #[test]
    fn capped_counts_need_no_request() {
        let settings = Settings::default();
        let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));
        let count = |size, cap| {
            count_pages(
                &UnreachableHttp,
                &settings,
                &query,
                Endpoint::Files,
                size,
                Some(cap),
            )
            .unwrap()
        };
        assert_eq!(count(6, 5), 1);
        assert_eq!(count(5, 5), 1);
        assert_eq!(count(5, 6), 2);
    }

    #[test]
    fn remote_page_count_is_read_back() {
        struct PaginationHttp;

        impl GdcHttp for PaginationHttp {
            fn get(
                &self,
                _url: &str,
                _params: &[(String, String)],
            ) -> Result<HttpResponse, GdcError> {
                Ok(HttpResponse {
                    status: 200,
                    body: r#"{"data": {"hits": [], "pagination": {"pages": 83}}}"#.to_string(),
                })
            }
        }

        let settings = Settings::default();
        let query = SearchQuery::new(Some("TCGA-BLCA"), Some("Clinical"));
        let pages = count_pages(
            &PaginationHttp,
            &settings,
            &query,
            Endpoint::Files,
            5,
            None,
        )
        .unwrap();
        assert_eq!(pages, 83);
    }
}
