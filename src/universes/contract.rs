//! Contracts: which node ids must be mounted in a given mode.

use serde::Deserialize;
use smallvec::SmallVec;

pub type NodeIds = SmallVec<[String; 4]>;

/// Immutable mode declaration. Carries no timing or animation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Contract {
    id: String,
    #[serde(rename = "activeNodeIds")]
    active_node_ids: NodeIds,
}

/// Node ids to unmount and mount when moving between two contracts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractDiff {
    pub exiting: NodeIds,
    pub entering: NodeIds,
}

impl ContractDiff {
    pub fn is_empty(&self) -> bool {
        self.exiting.is_empty() && self.entering.is_empty()
    }
}

impl Contract {
    pub fn new<I, S>(id: impl Into<String>, active_node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            active_node_ids: active_node_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn active_node_ids(&self) -> &[String] {
        &self.active_node_ids
    }

    pub fn requires(&self, node_id: &str) -> bool {
        self.active_node_ids.iter().any(|id| id == node_id)
    }

    /// Ids leaving (in `prev` only) and entering (in `self` only). Ids
    /// present in both are left alone. Order follows each contract's list.
    pub fn diff_from(&self, prev: Option<&Contract>) -> ContractDiff {
        let Some(prev) = prev else {
            return ContractDiff {
                exiting: NodeIds::new(),
                entering: self.active_node_ids.clone(),
            };
        };
        ContractDiff {
            exiting: prev
                .active_node_ids
                .iter()
                .filter(|id| !self.requires(id))
                .cloned()
                .collect(),
            entering: self
                .active_node_ids
                .iter()
                .filter(|id| !prev.requires(id))
                .cloned()
                .collect(),
        }
    }

    /// Diff against the actual mount state rather than the previous contract.
    ///
    /// Ids of `prev` or `unsettled` that are mounted but not required exit.
    /// Required ids that are not mounted enter. Used after a failed
    /// transition left the graph out of step with the current contract.
    pub fn reconcile(
        &self,
        prev: Option<&Contract>,
        unsettled: &[String],
        is_mounted: impl Fn(&str) -> bool,
    ) -> ContractDiff {
        let mut candidates = NodeIds::new();
        let previous = prev.map_or(&[][..], Contract::active_node_ids);
        for id in previous.iter().chain(unsettled) {
            if !candidates.contains(id) {
                candidates.push(id.clone());
            }
        }
        ContractDiff {
            exiting: candidates
                .into_iter()
                .filter(|id| !self.requires(id) && is_mounted(id.as_str()))
                .collect(),
            entering: self
                .active_node_ids
                .iter()
                .filter(|id| !is_mounted(id.as_str()))
                .cloned()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_keeps_shared_ids_mounted() {
        let x = Contract::new("x", ["1", "2"]);
        let y = Contract::new("y", ["2", "3"]);
        let diff = y.diff_from(Some(&x));
        assert_eq!(diff.exiting.as_slice(), ["1".to_string()]);
        assert_eq!(diff.entering.as_slice(), ["3".to_string()]);
    }

    #[test]
    fn first_contract_mounts_everything() {
        let x = Contract::new("x", ["1", "2"]);
        let diff = x.diff_from(None);
        assert!(diff.exiting.is_empty());
        assert_eq!(diff.entering.len(), 2);
        assert!(x.diff_from(Some(&x)).is_empty());
    }

    #[test]
    fn reconcile_follows_the_mounted_set() {
        let x = Contract::new("x", ["1"]);
        let unsettled = ["2".to_string(), "3".to_string()];
        let mounted = |id: &str| id == "2";
        let diff = x.reconcile(Some(&x), &unsettled, mounted);
        assert_eq!(diff.exiting.as_slice(), ["2".to_string()]);
        assert_eq!(diff.entering.as_slice(), ["1".to_string()]);
    }

    #[test]
    fn contracts_deserialize_from_definitions() {
        let contracts: Vec<Contract> =
            serde_json::from_str(r#"[{"id": "node-1", "activeNodeIds": ["node-1", "node-1b"]}]"#)
                .unwrap();
        assert_eq!(contracts[0], Contract::new("node-1", ["node-1", "node-1b"]));
    }
}
