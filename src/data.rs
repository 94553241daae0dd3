use crate::error::{InvalidPaginationSnafu, TallyResult};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

pub mod mark;
pub mod student;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// Raw `?page=&limit=` query. Kept as strings so that bad input becomes a
/// JSON validation error instead of an extractor rejection.
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl Page {
    pub fn from_query(query: &PageQuery) -> TallyResult<Self> {
        let page = parse_positive("page", query.page.as_deref(), DEFAULT_PAGE)?;
        let limit = parse_positive("limit", query.limit.as_deref(), DEFAULT_LIMIT)?;

        Ok(Self { page, limit })
    }

    pub fn offset(self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }

    pub fn limit(self) -> i64 {
        i64::from(self.limit)
    }

    pub fn paged<T>(self, data: Vec<T>, total: u64) -> Paged<T> {
        Paged {
            data,
            meta: PageMeta {
                total,
                page: self.page,
                limit: self.limit,
                total_pages: total.div_ceil(u64::from(self.limit)),
            },
        }
    }
}

fn parse_positive(param: &'static str, raw: Option<&str>, default: u32) -> TallyResult<u32> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(default);
    };

    raw.parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .context(InvalidPaginationSnafu {
            param,
            value: raw.to_string(),
        })
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

#[derive(Serialize, Debug)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}
