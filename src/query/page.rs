//! Pagination and sort computation.

use serde::Serialize;

pub const DEFAULT_PAGE_NUM: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

const PAGE_NUM_PARAMS: &[&str] = &["page", "pageNum"];
const PAGE_SIZE_PARAMS: &[&str] = &["size", "pageSize"];
const SORT_PARAMS: &[&str] = &["sort", "orderBy"];

/// A resolved page request. Both values are always >= 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page_num: i64,
    pub page_size: i64,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page_num: DEFAULT_PAGE_NUM,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new(page_num: Option<i64>, page_size: Option<i64>) -> Self {
        Page {
            page_num: page_num.unwrap_or(DEFAULT_PAGE_NUM).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).max(1),
        }
    }

    /// Read `page|pageNum` and `size|pageSize`; unparseable values fall back to `default_size`.
    pub fn from_params<'p, I>(params: I, default_size: i64) -> Self
    where
        I: IntoIterator<Item = (&'p str, &'p str)>,
    {
        let mut num = None;
        let mut size = None;
        for (k, v) in params {
            if PAGE_NUM_PARAMS.contains(&k) {
                num = v.trim().parse().ok().or(num);
            } else if PAGE_SIZE_PARAMS.contains(&k) {
                size = v.trim().parse().ok().or(size);
            }
        }
        Page::new(num, Some(size.unwrap_or(default_size)))
    }

    pub fn capped(mut self, max_size: Option<i64>) -> Self {
        if let Some(max) = max_size {
            self.page_size = self.page_size.min(max.max(1));
        }
        self
    }

    pub fn offset(&self) -> i64 {
        (self.page_num - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }
}

/// `(offset, limit)` for a 1-based page; missing or non-positive inputs are defaulted / clamped.
pub fn paginate(page_num: Option<i64>, page_size: Option<i64>) -> (i64, i64) {
    let page = Page::new(page_num, page_size);
    (page.offset(), page.limit())
}

/// `ceil(total / page_size)`; zero when there are no rows.
pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    let size = page_size.max(1);
    total / size + i64::from(total % size != 0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        SortField {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        SortField {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// `"-created_at,name"` -> created_at DESC, name ASC. Blank and malformed tokens are skipped.
/// Field names are not checked against any model here.
pub fn parse_sort(spec: &str) -> Vec<SortField> {
    spec.split(',')
        .filter_map(|token| {
            let token = token.trim();
            let (name, direction) = match token.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (token.strip_prefix('+').unwrap_or(token), SortDirection::Asc),
            };
            let valid = !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            valid.then(|| SortField {
                field: name.to_string(),
                direction,
            })
        })
        .collect()
}

/// Sort from the first `sort|orderBy` parameter present.
pub fn sort_from_params<'p, I>(params: I) -> Vec<SortField>
where
    I: IntoIterator<Item = (&'p str, &'p str)>,
{
    params
        .into_iter()
        .find(|(k, _)| SORT_PARAMS.contains(k))
        .map(|(_, v)| parse_sort(v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_defaults_and_clamps() {
        assert_eq!(paginate(None, None), (0, 10));
        assert_eq!(paginate(Some(2), Some(5)), (5, 5));
        assert_eq!(paginate(Some(0), Some(0)), (0, 1));
        assert_eq!(paginate(Some(-3), Some(20)), (0, 20));
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(1, 1), 1);
        assert_eq!(total_pages(5, i64::MAX), 1);
        assert_eq!(total_pages(i64::MAX, i64::MAX), 1);
        assert_eq!(total_pages(i64::MAX, 1), i64::MAX);
        for total in 0..50 {
            for size in 1..12 {
                let expected = (total as f64 / size as f64).ceil() as i64;
                assert_eq!(total_pages(total, size), expected);
            }
        }
    }

    #[test]
    fn test_from_params() {
        let p = Page::from_params([("pageNum", "3"), ("pageSize", "7")], DEFAULT_PAGE_SIZE);
        assert_eq!(p, Page { page_num: 3, page_size: 7 });
        let p = Page::from_params([("page", "abc")], 25);
        assert_eq!(p, Page { page_num: 1, page_size: 25 });
    }

    #[test]
    fn test_capped() {
        let p = Page::new(Some(1), Some(500)).capped(Some(100));
        assert_eq!(p.page_size, 100);
        assert_eq!(Page::new(Some(1), Some(5)).capped(None).page_size, 5);
    }

    #[test]
    fn test_parse_sort() {
        assert_eq!(
            parse_sort("-created_at, name,, +age"),
            vec![SortField::desc("created_at"), SortField::asc("name"), SortField::asc("age")]
        );
        assert!(parse_sort(" , -, name;drop").is_empty());
    }

    #[test]
    fn test_sort_from_params() {
        let s = sort_from_params([("name", "x"), ("orderBy", "-id")]);
        assert_eq!(s, vec![SortField::desc("id")]);
    }
}
