use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

static JOBS_CREATED: AtomicU64 = AtomicU64::new(0);
static JOBS_COMPLETED: AtomicU64 = AtomicU64::new(0);
static JOBS_FAILED: AtomicU64 = AtomicU64::new(0);
static PAYMENTS_CONFIRMED: AtomicU64 = AtomicU64::new(0);
static PAYMENT_DEADLINE_EXPIRIES: AtomicU64 = AtomicU64::new(0);
static CAS_RETRIES: AtomicU64 = AtomicU64::new(0);

static LAST_ERROR_TS: AtomicI64 = AtomicI64::new(0);

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_created: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub payments_confirmed: u64,
    pub payment_deadline_expiries: u64,
    pub cas_retries: u64,
    pub last_error_ts: i64,
}

pub fn inc_jobs_created() {
    JOBS_CREATED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_jobs_completed() {
    JOBS_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_jobs_failed() {
    JOBS_FAILED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_payments_confirmed() {
    PAYMENTS_CONFIRMED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_payment_deadline_expiries() {
    PAYMENT_DEADLINE_EXPIRIES.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_cas_retries() {
    CAS_RETRIES.fetch_add(1, Ordering::Relaxed);
}

pub fn set_last_error_ts(ts: i64) {
    LAST_ERROR_TS.store(ts, Ordering::Relaxed);
}

pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        jobs_created: JOBS_CREATED.load(Ordering::Relaxed),
        jobs_completed: JOBS_COMPLETED.load(Ordering::Relaxed),
        jobs_failed: JOBS_FAILED.load(Ordering::Relaxed),
        payments_confirmed: PAYMENTS_CONFIRMED.load(Ordering::Relaxed),
        payment_deadline_expiries: PAYMENT_DEADLINE_EXPIRIES.load(Ordering::Relaxed),
        cas_retries: CAS_RETRIES.load(Ordering::Relaxed),
        last_error_ts: LAST_ERROR_TS.load(Ordering::Relaxed),
    }
}
