//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building. Timestamps are stored as RFC 3339 TEXT; ids as UUID TEXT.

use sea_query::Iden;

/// Credit balances table schema (one row per tenant).
#[derive(Iden)]
pub enum CreditBalances {
    Table,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "balance"]
    Balance,
    #[iden = "total_received"]
    TotalReceived,
    #[iden = "total_spent"]
    TotalSpent,
    #[iden = "last_updated"]
    LastUpdated,
}

/// Credit transactions table schema (append-only).
#[derive(Iden)]
pub enum CreditTransactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "kind"]
    Kind,
    #[iden = "amount"]
    Amount,
    #[iden = "balance_before"]
    BalanceBefore,
    #[iden = "balance_after"]
    BalanceAfter,
    #[iden = "reference_id"]
    ReferenceId,
    #[iden = "reference_kind"]
    ReferenceKind,
    #[iden = "description"]
    Description,
    #[iden = "created_by"]
    CreatedBy,
    #[iden = "created_at"]
    CreatedAt,
}

/// Credit requests table schema.
#[derive(Iden)]
pub enum CreditRequests {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "requested_amount"]
    RequestedAmount,
    #[iden = "justification"]
    Justification,
    #[iden = "status"]
    Status,
    #[iden = "requested_at"]
    RequestedAt,
    #[iden = "processed_at"]
    ProcessedAt,
    #[iden = "processed_by"]
    ProcessedBy,
    #[iden = "rejection_reason"]
    RejectionReason,
}

/// Coupon batches table schema.
#[derive(Iden)]
pub enum CouponBatches {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "verification_app_id"]
    VerificationAppId,
    #[iden = "description"]
    Description,
    #[iden = "discount_value"]
    DiscountValue,
    #[iden = "discount_kind"]
    DiscountKind,
    #[iden = "quantity"]
    Quantity,
    #[iden = "expiry_date"]
    ExpiryDate,
    #[iden = "printed_at"]
    PrintedAt,
    #[iden = "print_note"]
    PrintNote,
    #[iden = "created_at"]
    CreatedAt,
}

/// Coupons table schema. Primary key is (tenant_id, code).
#[derive(Iden)]
pub enum Coupons {
    Table,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "code"]
    Code,
    #[iden = "batch_id"]
    BatchId,
    #[iden = "verification_app_id"]
    VerificationAppId,
    #[iden = "discount_value"]
    DiscountValue,
    #[iden = "discount_kind"]
    DiscountKind,
    #[iden = "status"]
    Status,
    #[iden = "usage_limit"]
    UsageLimit,
    #[iden = "coupon_points"]
    CouponPoints,
    #[iden = "expiry_date"]
    ExpiryDate,
    #[iden = "deactivation_reason"]
    DeactivationReason,
    #[iden = "created_at"]
    CreatedAt,
}

/// Scans table schema (one row per validated redemption).
#[derive(Iden)]
pub enum Scans {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "coupon_code"]
    CouponCode,
    #[iden = "customer_id"]
    CustomerId,
    #[iden = "status"]
    Status,
    #[iden = "location"]
    Location,
    #[iden = "device_info"]
    DeviceInfo,
    #[iden = "scanned_at"]
    ScannedAt,
}

/// Points balances table schema. Primary key is (tenant_id, customer_id).
#[derive(Iden)]
pub enum PointsBalances {
    Table,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "customer_id"]
    CustomerId,
    #[iden = "balance"]
    Balance,
    #[iden = "total_earned"]
    TotalEarned,
    #[iden = "total_spent"]
    TotalSpent,
    #[iden = "last_updated"]
    LastUpdated,
}

/// Points transactions table schema (append-only).
#[derive(Iden)]
pub enum PointsTransactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "customer_id"]
    CustomerId,
    #[iden = "kind"]
    Kind,
    #[iden = "amount"]
    Amount,
    #[iden = "balance_before"]
    BalanceBefore,
    #[iden = "balance_after"]
    BalanceAfter,
    #[iden = "reference_id"]
    ReferenceId,
    #[iden = "reference_kind"]
    ReferenceKind,
    #[iden = "description"]
    Description,
    #[iden = "created_at"]
    CreatedAt,
}

/// Verification apps table schema.
#[derive(Iden)]
pub enum VerificationApps {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "app_code"]
    AppCode,
    #[iden = "api_key_hash"]
    ApiKeyHash,
    #[iden = "active"]
    Active,
    #[iden = "created_at"]
    CreatedAt,
}

/// Products table schema.
#[derive(Iden)]
pub enum Products {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "tenant_id"]
    TenantId,
    #[iden = "verification_app_id"]
    VerificationAppId,
    #[iden = "points_price"]
    PointsPrice,
    #[iden = "active"]
    Active,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for creating the ledger tables.
pub const CREATE_LEDGER_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS credit_balances (
    tenant_id TEXT NOT NULL PRIMARY KEY,
    balance INTEGER NOT NULL,
    total_received INTEGER NOT NULL,
    total_spent INTEGER NOT NULL,
    last_updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS credit_transactions (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL,
    balance_before INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    reference_id TEXT,
    reference_kind TEXT NOT NULL,
    description TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_credit_transactions_tenant
    ON credit_transactions(tenant_id, created_at);

CREATE TABLE IF NOT EXISTS points_balances (
    tenant_id TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    balance INTEGER NOT NULL,
    total_earned INTEGER NOT NULL,
    total_spent INTEGER NOT NULL,
    last_updated TEXT NOT NULL,
    PRIMARY KEY (tenant_id, customer_id)
);

CREATE TABLE IF NOT EXISTS points_transactions (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL,
    balance_before INTEGER NOT NULL,
    balance_after INTEGER NOT NULL,
    reference_id TEXT,
    reference_kind TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_points_transactions_customer
    ON points_transactions(tenant_id, customer_id, created_at);
"#;

/// SQL for creating the credit request table.
///
/// The partial unique index is the backstop for the one-pending-request
/// rule; the store also checks explicitly to return the precise error.
pub const CREATE_REQUEST_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS credit_requests (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    requested_amount INTEGER NOT NULL,
    justification TEXT NOT NULL,
    status TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    processed_at TEXT,
    processed_by TEXT,
    rejection_reason TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_credit_requests_pending
    ON credit_requests(tenant_id) WHERE status = 'pending';
"#;

/// SQL for creating the coupon and scan tables.
pub const CREATE_COUPON_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS coupon_batches (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    verification_app_id TEXT NOT NULL,
    description TEXT NOT NULL,
    discount_value INTEGER NOT NULL,
    discount_kind TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    expiry_date TEXT NOT NULL,
    printed_at TEXT,
    print_note TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_coupon_batches_tenant ON coupon_batches(tenant_id);

CREATE TABLE IF NOT EXISTS coupons (
    tenant_id TEXT NOT NULL,
    code TEXT NOT NULL,
    batch_id TEXT NOT NULL,
    verification_app_id TEXT NOT NULL,
    discount_value INTEGER NOT NULL,
    discount_kind TEXT NOT NULL,
    status TEXT NOT NULL,
    usage_limit INTEGER NOT NULL,
    coupon_points INTEGER NOT NULL,
    expiry_date TEXT NOT NULL,
    deactivation_reason TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tenant_id, code)
);

CREATE INDEX IF NOT EXISTS idx_coupons_batch ON coupons(batch_id);

CREATE TABLE IF NOT EXISTS scans (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    coupon_code TEXT NOT NULL,
    customer_id TEXT NOT NULL,
    status TEXT NOT NULL,
    location TEXT,
    device_info TEXT,
    scanned_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scans_coupon ON scans(tenant_id, coupon_code);
"#;

/// SQL for creating the access gate tables.
pub const CREATE_ACCESS_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS verification_apps (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    app_code TEXT NOT NULL,
    api_key_hash TEXT NOT NULL UNIQUE,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id TEXT NOT NULL PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    verification_app_id TEXT NOT NULL,
    points_price INTEGER NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
"#;
