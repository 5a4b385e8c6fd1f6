//! A single configured provisioner for a VM.
//!
//! Declarations resolve their kind against a [`TypeRegistry`] once, at
//! construction. A kind without an executor marks the declaration invalid;
//! invalid declarations silently ignore config accumulation and finalize so
//! one bad entry never aborts the surrounding configuration pass.

use derive_more::Display;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::id::{ProvisionerId, ProvisionerKind};
use crate::payload::{ConfigPayload, DummySchema, Options, SchemaFactory};
use crate::registry::TypeRegistry;
use crate::{Error, Result};

/// When a provisioner runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RunPolicy {
    /// Only on first boot.
    #[display("once")]
    Once,
    /// On every boot.
    #[display("always")]
    Always,
    /// Only when requested explicitly.
    #[display("never")]
    Never,
}

impl FromStr for RunPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "once" => Ok(Self::Once),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(Error::InvalidValue {
                field: "run".to_string(),
                message: format!("expected once, always or never, got '{}'", other),
            }),
        }
    }
}

/// A provisioner declaration.
#[derive(Clone)]
pub struct ProvisionerDeclaration {
    name: Option<String>,
    id: ProvisionerId,
    kind: ProvisionerKind,
    config: Option<Box<dyn ConfigPayload>>,
    run: Option<RunPolicy>,
    preserve_order: bool,
    before: Option<String>,
    after: Option<String>,
    invalid: bool,
    schema: Arc<dyn SchemaFactory>,
}

impl ProvisionerDeclaration {
    /// Declare a provisioner of `kind`, optionally named.
    ///
    /// Never fails. An unregistered kind yields an invalid declaration and a
    /// kind without a schema is bound to [`DummySchema`].
    pub fn new(
        name: Option<&str>,
        kind: impl Into<ProvisionerKind>,
        registry: &dyn TypeRegistry,
    ) -> Self {
        let name = name.filter(|n| !n.is_empty()).map(str::to_string);
        let id = ProvisionerId::from_name(name.as_deref());
        let kind = kind.into();

        debug!(id = %id, kind = %kind, "Provisioner defined");

        let invalid = !registry.has_executor(&kind);
        if invalid {
            warn!(id = %id, kind = %kind, "Provisioner kind not found");
        }

        let schema = registry.schema_factory(&kind).unwrap_or_else(|| {
            info!(kind = %kind, "No config schema for provisioner kind, ignoring config");
            Arc::new(DummySchema)
        });

        Self {
            name,
            id,
            kind,
            config: None,
            run: None,
            preserve_order: false,
            before: None,
            after: None,
            invalid,
            schema,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn id(&self) -> &ProvisionerId {
        &self.id
    }

    pub fn kind(&self) -> &ProvisionerKind {
        &self.kind
    }

    /// The accumulated payload, if any config was ever added.
    pub fn config(&self) -> Option<&dyn ConfigPayload> {
        self.config.as_deref()
    }

    /// The accumulated payload downcast to `T`.
    pub fn config_as<T: ConfigPayload>(&self) -> Option<&T> {
        self.config().and_then(|c| c.downcast_ref::<T>())
    }

    pub fn run(&self) -> Option<RunPolicy> {
        self.run
    }

    pub fn set_run(&mut self, run: Option<RunPolicy>) {
        self.run = run;
    }

    pub fn preserve_order(&self) -> bool {
        self.preserve_order
    }

    pub fn set_preserve_order(&mut self, preserve_order: bool) {
        self.preserve_order = preserve_order;
    }

    pub fn before(&self) -> Option<&str> {
        self.before.as_deref()
    }

    pub fn set_before(&mut self, before: Option<String>) {
        self.before = before;
    }

    pub fn after(&self) -> Option<&str> {
        self.after.as_deref()
    }

    pub fn set_after(&mut self, after: Option<String>) {
        self.after = after;
    }

    /// Whether the kind had no executor at construction time.
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Accumulate `options` into the config.
    pub fn add_config(&mut self, options: &Options) {
        self.add_config_with(options, |_| {});
    }

    /// Accumulate `options` into the config, letting `mutator` adjust the
    /// fresh payload before it is merged onto any prior one.
    pub fn add_config_with<F>(&mut self, options: &Options, mutator: F)
    where
        F: FnOnce(&mut dyn ConfigPayload),
    {
        if self.invalid {
            return;
        }

        let mut current = self.schema.instantiate();
        current.set_options(options);
        mutator(&mut *current);

        let merged = match self.config.take() {
            Some(prior) => prior.merge(&*current),
            None => current,
        };
        self.config = Some(merged);
    }

    /// Finalize the payload. Errors from the payload are returned unchanged.
    pub fn finalize(&mut self) -> Result<()> {
        if self.invalid {
            return Ok(());
        }

        match self.config.as_mut() {
            Some(config) => config.finalize(),
            None => Ok(()),
        }
    }

    /// Treat `self` as the override of `parent` in a child scope: the config
    /// becomes `parent.config` merged with ours, and an unset run policy is
    /// taken from the parent. An invalid override never takes on config.
    pub fn inherit_from(&mut self, parent: &ProvisionerDeclaration) {
        self.run = self.run.or(parent.run);
        if self.invalid {
            return;
        }
        self.config = match (parent.config.as_ref(), self.config.take()) {
            (Some(base), Some(ours)) => Some(base.merge(&*ours)),
            (Some(base), None) => Some(base.clone()),
            (None, ours) => ours,
        };
    }
}

impl fmt::Debug for ProvisionerDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionerDeclaration")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("run", &self.run)
            .field("preserve_order", &self.preserve_order)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("invalid", &self.invalid)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{DummyConfig, merge_typed};
    use crate::registry::KindRegistry;
    use serde_json::{Value, json};
    use std::any::Any;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Fields {
        a: Option<i64>,
        b: Option<i64>,
        inline: Option<String>,
        finalized: u32,
    }

    impl ConfigPayload for Fields {
        fn set_options(&mut self, options: &Options) {
            for (key, value) in options {
                match key.as_str() {
                    "a" => self.a = value.as_i64(),
                    "b" => self.b = value.as_i64(),
                    "inline" => self.inline = value.as_str().map(str::to_string),
                    _ => {}
                }
            }
        }

        fn merge(&self, other: &dyn ConfigPayload) -> Box<dyn ConfigPayload> {
            merge_typed(self, other, |base, other| Fields {
                a: other.a.or(base.a),
                b: other.b.or(base.b),
                inline: other.inline.clone().or_else(|| base.inline.clone()),
                finalized: base.finalized.max(other.finalized),
            })
        }

        fn finalize(&mut self) -> Result<()> {
            self.finalized += 1;
            Ok(())
        }

        fn clone_box(&self) -> Box<dyn ConfigPayload> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Failing;

    impl ConfigPayload for Failing {
        fn set_options(&mut self, _options: &Options) {}

        fn merge(&self, other: &dyn ConfigPayload) -> Box<dyn ConfigPayload> {
            other.clone_box()
        }

        fn finalize(&mut self) -> Result<()> {
            Err(Error::Finalize {
                kind: "failing".to_string(),
                message: "boom".to_string(),
            })
        }

        fn clone_box(&self) -> Box<dyn ConfigPayload> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn registry() -> KindRegistry {
        KindRegistry::builder()
            .provisioner::<Fields>("shell")
            .provisioner::<Failing>("failing")
            .executor("bare")
            .schema::<Fields>("orphan")
            .build()
    }

    fn options(value: Value) -> Options {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => panic!("options must be an object"),
        }
    }

    #[test]
    fn test_registered_kind_is_valid() {
        let decl = ProvisionerDeclaration::new(Some("web"), "shell", &registry());
        assert!(!decl.is_invalid());
        assert_eq!(decl.id().as_str(), "web");
        assert_eq!(decl.name(), Some("web"));
        assert_eq!(decl.kind().as_str(), "shell");
        assert!(decl.config().is_none());
        assert_eq!(decl.run(), None);
        assert!(!decl.preserve_order());
        assert_eq!(decl.before(), None);
        assert_eq!(decl.after(), None);
    }

    #[test]
    fn test_unregistered_kind_is_invalid() {
        let reg = registry();
        let a = ProvisionerDeclaration::new(None, "nonexistent_type", &reg);
        let b = ProvisionerDeclaration::new(None, "nonexistent_type", &reg);
        assert!(a.is_invalid());
        assert!(!a.id().as_str().is_empty());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.name(), None);
    }

    #[test]
    fn test_schema_without_executor_is_invalid() {
        let decl = ProvisionerDeclaration::new(None, "orphan", &registry());
        assert!(decl.is_invalid());
    }

    #[test]
    fn test_empty_name_is_unnamed() {
        let decl = ProvisionerDeclaration::new(Some(""), "shell", &registry());
        assert_eq!(decl.name(), None);
        assert!(!decl.id().as_str().is_empty());
    }

    #[test]
    fn test_invalid_ignores_config_and_finalize() {
        let mut decl = ProvisionerDeclaration::new(None, "nonexistent_type", &registry());
        for _ in 0..3 {
            decl.add_config(&options(json!({"a": 1})));
            assert!(decl.is_invalid());
        }
        decl.add_config_with(&options(json!({})), |_| panic!("mutator must not run"));
        assert!(decl.config().is_none());
        assert!(decl.finalize().is_ok());
        assert!(decl.config().is_none());
    }

    #[test]
    fn test_shell_scenario() {
        let mut decl = ProvisionerDeclaration::new(Some("web"), "shell", &registry());
        decl.add_config(&options(json!({"inline": "echo hi"})));
        assert!(!decl.is_invalid());
        assert_eq!(
            decl.config_as::<Fields>().unwrap().inline.as_deref(),
            Some("echo hi")
        );
    }

    #[test]
    fn test_accumulate_is_right_biased() {
        let mut decl = ProvisionerDeclaration::new(None, "shell", &registry());
        decl.add_config(&options(json!({"a": 1})));
        decl.add_config(&options(json!({"a": 2, "b": 3})));
        let fields = decl.config_as::<Fields>().unwrap();
        assert_eq!(fields.a, Some(2));
        assert_eq!(fields.b, Some(3));

        decl.add_config(&options(json!({"inline": "x"})));
        let fields = decl.config_as::<Fields>().unwrap();
        assert_eq!(fields.a, Some(2));
        assert_eq!(fields.b, Some(3));
        assert_eq!(fields.inline.as_deref(), Some("x"));
    }

    #[test]
    fn test_mutator_runs_on_fresh_payload() {
        let mut decl = ProvisionerDeclaration::new(None, "shell", &registry());
        decl.add_config(&options(json!({"a": 1, "b": 1})));
        decl.add_config_with(&options(json!({"a": 5})), |payload| {
            let fields = payload.downcast_mut::<Fields>().unwrap();
            assert_eq!(fields.b, None);
            fields.b = Some(10);
        });
        let fields = decl.config_as::<Fields>().unwrap();
        assert_eq!(fields.a, Some(5));
        assert_eq!(fields.b, Some(10));
    }

    #[test]
    fn test_add_config_does_not_mutate_options() {
        let mut decl = ProvisionerDeclaration::new(None, "shell", &registry());
        let opts = options(json!({"a": 1}));
        let before = opts.clone();
        decl.add_config(&opts);
        assert_eq!(opts, before);
    }

    #[test]
    fn test_missing_schema_uses_dummy() {
        let mut decl = ProvisionerDeclaration::new(Some("x"), "bare", &registry());
        assert!(!decl.is_invalid());
        decl.add_config(&options(json!({"a": 1})));
        assert!(decl.config().unwrap().is::<DummyConfig>());
        assert!(decl.finalize().is_ok());
    }

    #[test]
    fn test_finalize_delegates_to_payload() {
        let mut decl = ProvisionerDeclaration::new(None, "shell", &registry());
        decl.add_config(&options(json!({"a": 1})));
        decl.finalize().unwrap();
        assert_eq!(decl.config_as::<Fields>().unwrap().finalized, 1);
    }

    #[test]
    fn test_finalize_without_config_is_noop() {
        let mut decl = ProvisionerDeclaration::new(None, "shell", &registry());
        assert!(decl.finalize().is_ok());
        assert!(decl.config().is_none());
    }

    #[test]
    fn test_finalize_error_propagates() {
        let mut decl = ProvisionerDeclaration::new(None, "failing", &registry());
        decl.add_config(&Options::new());
        let err = decl.finalize().unwrap_err();
        assert!(matches!(
            err,
            Error::Finalize { ref kind, ref message } if kind == "failing" && message == "boom"
        ));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = ProvisionerDeclaration::new(Some("web"), "shell", &registry());
        original.set_run(Some(RunPolicy::Always));
        original.set_before(Some("db".to_string()));
        original.add_config(&options(json!({"a": 1})));

        let mut copy = original.clone();
        assert_eq!(copy.id(), original.id());
        assert_eq!(copy.run(), Some(RunPolicy::Always));
        assert_eq!(copy.before(), Some("db"));

        copy.add_config(&options(json!({"a": 2})));
        assert_eq!(original.config_as::<Fields>().unwrap().a, Some(1));
        assert_eq!(copy.config_as::<Fields>().unwrap().a, Some(2));

        original.add_config(&options(json!({"b": 9})));
        assert_eq!(copy.config_as::<Fields>().unwrap().b, None);
    }

    #[test]
    fn test_clone_of_invalid_stays_invalid() {
        let decl = ProvisionerDeclaration::new(None, "nope", &registry());
        let copy = decl.clone();
        assert!(copy.is_invalid());
        assert!(copy.config().is_none());
    }

    #[test]
    fn test_setters() {
        let mut decl = ProvisionerDeclaration::new(None, "shell", &registry());
        decl.set_preserve_order(true);
        decl.set_after(Some("base".to_string()));
        decl.set_run(Some(RunPolicy::Never));
        assert!(decl.preserve_order());
        assert_eq!(decl.after(), Some("base"));
        assert_eq!(decl.run(), Some(RunPolicy::Never));
    }

    #[test]
    fn test_inherit_from_parent() {
        let reg = registry();
        let mut parent = ProvisionerDeclaration::new(Some("web"), "shell", &reg);
        parent.set_run(Some(RunPolicy::Once));
        parent.add_config(&options(json!({"a": 1, "b": 1})));

        let mut child = ProvisionerDeclaration::new(Some("web"), "shell", &reg);
        child.add_config(&options(json!({"b": 2})));
        child.inherit_from(&parent);

        let fields = child.config_as::<Fields>().unwrap();
        assert_eq!(fields.a, Some(1));
        assert_eq!(fields.b, Some(2));
        assert_eq!(child.run(), Some(RunPolicy::Once));
        assert_eq!(parent.config_as::<Fields>().unwrap().b, Some(1));
    }

    #[test]
    fn test_inherit_keeps_own_run() {
        let reg = registry();
        let mut parent = ProvisionerDeclaration::new(Some("web"), "shell", &reg);
        parent.set_run(Some(RunPolicy::Once));
        let mut child = ProvisionerDeclaration::new(Some("web"), "shell", &reg);
        child.set_run(Some(RunPolicy::Always));
        child.inherit_from(&parent);
        assert_eq!(child.run(), Some(RunPolicy::Always));
        assert!(child.config().is_none());
    }

    #[test]
    fn test_run_policy_parse() {
        assert_eq!("once".parse::<RunPolicy>().unwrap(), RunPolicy::Once);
        assert_eq!("always".parse::<RunPolicy>().unwrap(), RunPolicy::Always);
        assert_eq!("never".parse::<RunPolicy>().unwrap(), RunPolicy::Never);
        assert!(matches!(
            "sometimes".parse::<RunPolicy>(),
            Err(Error::InvalidValue { .. })
        ));
        assert_eq!(RunPolicy::Always.to_string(), "always");
    }
}
