use sea_orm::QuerySelect;

pub mod comment;
pub mod item;
pub mod order;
pub mod order_status;
pub mod tag;

/// LIMIT and OFFSET are bound as signed 64-bit integers.
const MAX_SQL_BOUND: u64 = i64::MAX as u64;

/// Applies `offset`/`limit` to a select, with `limit == 0` meaning unbounded.
/// Values past the signed range are clamped instead of reaching the binder.
pub(crate) fn paginate<S: QuerySelect>(query: S, offset: u64, limit: u64) -> S {
    let offset = offset.min(MAX_SQL_BOUND);
    let limit = limit.min(MAX_SQL_BOUND);
    match (offset, limit) {
        (0, 0) => query,
        // SQLite rejects OFFSET without LIMIT.
        (offset, 0) => query.offset(offset).limit(MAX_SQL_BOUND),
        (offset, limit) => query.offset(offset).limit(limit),
    }
}
