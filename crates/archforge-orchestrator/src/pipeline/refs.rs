//! Per-run map of stage outputs

use super::Stage;
use crate::error::OrchestrationError;
use crate::locator::ResourceRef;
use std::collections::HashMap;

/// Resource references produced by the stages of one create run
///
/// A stage may only read the outputs of stages it declares as dependencies.
#[derive(Debug, Default)]
pub struct ResolvedRefs {
    outputs: HashMap<Stage, ResourceRef>,
}

impl ResolvedRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stage: Stage, reference: ResourceRef) {
        self.outputs.insert(stage, reference);
    }

    /// Output of `dependency`, read on behalf of `stage`.
    pub fn require(&self, stage: Stage, dependency: Stage) -> Result<&ResourceRef, OrchestrationError> {
        if !stage.dependencies().contains(&dependency) {
            return Err(OrchestrationError::MissingDependency { stage, dependency });
        }
        self.outputs
            .get(&dependency)
            .ok_or(OrchestrationError::MissingDependency { stage, dependency })
    }

    /// Identifier produced by `dependency`, read on behalf of `stage`.
    pub fn id(&self, stage: Stage, dependency: Stage) -> Result<String, OrchestrationError> {
        self.require(stage, dependency).map(|r| r.id.clone())
    }

    pub fn get(&self, stage: Stage) -> Option<&ResourceRef> {
        self.outputs.get(&stage)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archforge_common::ResourceKind;

    #[test]
    fn test_declared_dependency_is_readable() {
        let mut refs = ResolvedRefs::new();
        refs.insert(Stage::Vpc, ResourceRef::new(ResourceKind::Vpc, "web-vpc", "vpc-1"));
        assert_eq!(refs.id(Stage::InternetGateway, Stage::Vpc).unwrap(), "vpc-1");
    }

    #[test]
    fn test_undeclared_dependency_is_rejected() {
        let mut refs = ResolvedRefs::new();
        refs.insert(Stage::Vpc, ResourceRef::new(ResourceKind::Vpc, "web-vpc", "vpc-1"));
        let err = refs.id(Stage::ElasticIp, Stage::Vpc).unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::MissingDependency {
                stage: Stage::ElasticIp,
                dependency: Stage::Vpc
            }
        ));
    }

    #[test]
    fn test_missing_output_is_rejected() {
        let refs = ResolvedRefs::new();
        assert!(refs.id(Stage::InternetGateway, Stage::Vpc).is_err());
    }
}
