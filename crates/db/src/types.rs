use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

/// Highest score an order can be appraised with. Scores start at 1; 0 means "not appraised".
pub const MAX_APPRAISAL: i32 = 5;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
    Default,
)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    #[sea_orm(num_value = 1)]
    Waiting,
    #[sea_orm(num_value = 2)]
    Assigned,
    #[sea_orm(num_value = 3)]
    Completed,
    #[sea_orm(num_value = 4)]
    Reported,
    #[sea_orm(num_value = 5)]
    Hold,
    #[sea_orm(num_value = 6)]
    Canceled,
    #[sea_orm(num_value = 7)]
    Rejected,
    #[sea_orm(num_value = 8)]
    Appraised,
}

impl OrderStatus {
    pub fn code(self) -> i32 {
        self.to_value()
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::try_from_value(&code).ok()
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Appraised | OrderStatus::Canceled | OrderStatus::Rejected
        )
    }

    /// Edges of the order state graph. Re-assigning an assigned order is allowed
    /// so a dispatcher can hand work to another repairer.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        match (self, next) {
            (Waiting, Assigned | Hold | Canceled | Rejected) => true,
            (Assigned, Waiting | Assigned | Completed | Reported | Hold | Canceled) => true,
            (Reported, Waiting | Assigned | Hold | Canceled | Rejected) => true,
            (Hold, Waiting | Assigned | Canceled | Rejected) => true,
            (Completed, Appraised) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use sea_orm::Iterable;

    use super::*;

    #[test]
    fn status_codes_are_stable() {
        let codes: Vec<i32> = OrderStatus::iter().map(OrderStatus::code).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(OrderStatus::from_code(3), Some(OrderStatus::Completed));
        assert_eq!(OrderStatus::from_code(0), None);
        assert_eq!(OrderStatus::from_code(9), None);
    }

    #[test]
    fn status_parses_from_lowercase_name() {
        assert_eq!(OrderStatus::from_str("hold").unwrap(), OrderStatus::Hold);
        assert_eq!(OrderStatus::Appraised.to_string(), "appraised");
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in OrderStatus::iter().filter(|status| status.is_terminal()) {
            for to in OrderStatus::iter() {
                assert!(
                    !from.can_transition_to(to),
                    "{from} should not transition to {to}"
                );
            }
        }
    }

    #[test]
    fn appraised_is_only_reachable_from_completed() {
        for from in OrderStatus::iter() {
            assert_eq!(
                from.can_transition_to(OrderStatus::Appraised),
                from == OrderStatus::Completed
            );
        }
    }

    #[test]
    fn completed_requires_assignment() {
        assert!(OrderStatus::Assigned.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Waiting.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Hold.can_transition_to(OrderStatus::Completed));
    }
}
