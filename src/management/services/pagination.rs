//! 分页参数

/// 默认每页条数
pub const DEFAULT_PAGE_SIZE: u64 = 10;
/// 每页条数上限
pub const MAX_PAGE_SIZE: u64 = 100;

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    /// 当前页码（>= 1）
    pub page: u64,
    /// 每页条数（>= 1）
    pub page_size: u64,
}

impl PaginationParams {
    /// 根据可选参数创建分页配置，并应用默认值与上限。
    #[must_use]
    pub fn new(page: Option<u64>, page_size: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// 查询偏移量
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page - 1) * self.page_size
    }
}
