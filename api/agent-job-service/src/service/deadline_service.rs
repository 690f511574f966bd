use crate::module::agent_job::model::JobRecord;

/// True when a payment-gated job is still unpaid after its `submit_result_time`.
///
/// Pure in `(now, record)`: evaluated opportunistically on reads and writes and again by the
/// background sweep, so no per-job timer exists.
pub fn payment_deadline_elapsed(now: i64, record: &JobRecord, payment_required: bool) -> bool {
    payment_required
        && record.payment.is_none()
        && !record.status.is_terminal()
        && now > record.submit_result_time
}

pub fn expiry_detail(record: &JobRecord) -> String {
    format!(
        "payment deadline expired: no confirmed payment before submitResultTime {}",
        record.submit_result_time
    )
}
