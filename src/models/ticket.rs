use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MAX_VIRTUAL_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Available,
    /// 预留中或待审批
    Reserved,
    Sold,
}

/// 读取时计算的票号视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VirtualTicket {
    pub index: i64,
    pub number: String,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct VirtualTicketCounts {
    pub total: i64,
    pub sold: i64,
    pub reserved: i64,
    pub available: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StatusCount {
    pub orders: i64,
    pub tickets: i64,
}

/// 按订单状态统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTicketCounts {
    pub reserved: StatusCount,
    /// reserved 中已过期、尚未被清理的部分
    pub expired_holds: StatusCount,
    pub pending: StatusCount,
    pub sold: StatusCount,
    pub canceled: StatusCount,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VirtualTicketQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TicketSearchQuery {
    #[schema(example = "0042")]
    pub number: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TicketSearchResult {
    pub found: bool,
    pub ticket: Option<VirtualTicket>,
}
