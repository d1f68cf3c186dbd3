//! 分页相关的数据结构

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PaginationParams {
    pub page: i64,
    pub page_size: i64,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationParams {
    /// 页码从 1 开始；每页数量限制在 [1, max]
    pub fn new(page: Option<u32>, per_page: Option<u32>, max: i64) -> Self {
        Self {
            page: page.map(|p| p as i64).unwrap_or(1).max(1),
            page_size: per_page
                .map(|p| p as i64)
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, max),
        }
    }

    pub fn get_offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn get_limit(&self) -> i64 {
        self.page_size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, params: PaginationParams, total: i64) -> Self {
        let total_pages = (total + params.page_size - 1) / params.page_size;
        Self {
            data,
            page: params.page,
            page_size: params.page_size,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_are_clamped() {
        let p = PaginationParams::new(Some(0), Some(10_000), MAX_PAGE_SIZE);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);
        assert_eq!(p.get_offset(), 0);

        let p = PaginationParams::new(Some(3), Some(25), MAX_PAGE_SIZE);
        assert_eq!(p.get_offset(), 50);
        assert_eq!(p.get_limit(), 25);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let p = PaginationParams::new(Some(1), Some(20), MAX_PAGE_SIZE);
        let r: PaginatedResponse<i32> = PaginatedResponse::new(vec![], p, 41);
        assert_eq!(r.total_pages, 3);
        let r: PaginatedResponse<i32> = PaginatedResponse::new(vec![], p, 0);
        assert_eq!(r.total_pages, 0);
    }
}
