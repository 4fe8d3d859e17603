//! Resource lifecycle engine.
//!
//! Every hosted kind implements [`Resource`] (or [`DataSource`]) and is
//! driven through a [`ResourceRuntime`] (or [`DataSourceRuntime`]) which
//! owns the parts of the protocol shared by all kinds:
//!
//! - the configure slot holding the shared [`ProviderData`]
//! - schema and config validation
//! - default plan computation, replacement triggers and the in-use gate
//! - absent-on-read removal and not-found-on-delete success
//! - post-delete quiescence bounded by the caller's deadline
//! - state normalisation, including JSON config reconciliation

use std::any::Any;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::GraphqlClient;
use crate::json_string::JsonObjectString;
use crate::plan::{self, PlanRequest, PlanResult};
use crate::schema::{AttributeType, Diagnostic, Schema};
use crate::validation::{self, ConfigValidator};
use crate::value::{AttrValue, Dynamic, ValueTree};

/// The handle every resource and data source receives on configure.
#[derive(Debug, Clone)]
pub struct ProviderData {
    /// The authenticated GraphQL client.
    pub client: GraphqlClient,
    /// The tenant every key is scoped to.
    pub tenant: String,
}

/// A managed resource kind.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The kind name, without the provider prefix.
    fn type_name(&self) -> &'static str;

    /// Attribute declarations.
    fn schema(&self) -> Schema;

    /// Cross-attribute validators.
    fn config_validators(&self) -> Vec<Box<dyn ConfigValidator>> {
        Vec::new()
    }

    /// Whether destroy and replace are refused while `in_use` is true.
    fn in_use_gated(&self) -> bool {
        false
    }

    /// Time the service needs to settle after a delete.
    fn post_delete_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// How the instance is named in messages.
    fn display_key(&self, state: &ValueTree) -> String {
        state.raw("name").as_str().unwrap_or("<unnamed>").to_string()
    }

    /// Create the object from a plan and return its state.
    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError>;

    /// Refresh state; `None` when the object no longer exists.
    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError>;

    /// Apply a plan to an existing object and return its state.
    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError>;

    /// Delete the object.
    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError>;

    /// Seed state from an import identifier; the next read fills the rest.
    fn import_state(&self, id: &str) -> Result<ValueTree, ProviderError> {
        if id.is_empty() {
            return Err(ProviderError::ImportIdInvalid {
                id: id.to_string(),
                reason: "identifier must not be empty".to_string(),
            });
        }
        let mut state = ValueTree::new();
        state.set_known("name", id.to_string());
        Ok(state)
    }

    /// Adjust a plan after the default plan has been computed.
    async fn modify_plan(
        &self,
        ctx: &Context,
        data: &ProviderData,
        req: &mut PlanRequest,
    ) -> Result<(), ProviderError> {
        let _ = (ctx, data, req);
        Ok(())
    }
}

/// A read-only kind.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The kind name, without the provider prefix.
    fn type_name(&self) -> &'static str;

    /// Attribute declarations.
    fn schema(&self) -> Schema;

    /// Cross-attribute validators.
    fn config_validators(&self) -> Vec<Box<dyn ConfigValidator>> {
        Vec::new()
    }

    /// Look the object up from its config.
    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        config: &ValueTree,
    ) -> Result<ValueTree, ProviderError>;
}

/// Holds the [`ProviderData`] published by provider configure.
#[derive(Debug, Default)]
struct ConfigureSlot {
    data: RwLock<Option<Arc<ProviderData>>>,
}

impl ConfigureSlot {
    fn configure(
        &self,
        type_name: &str,
        handle: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Result<(), ProviderError> {
        let Some(handle) = handle else {
            debug!(resource_type = type_name, "Configure called without provider data");
            return Ok(());
        };
        let data = handle.downcast::<ProviderData>().map_err(|_| {
            ProviderError::ProviderMisconfigured(format!(
                "{} received provider data of an unexpected type",
                type_name
            ))
        })?;
        let mut slot = self
            .data
            .write()
            .map_err(|_| ProviderError::ProviderMisconfigured("configure slot poisoned".to_string()))?;
        *slot = Some(data);
        Ok(())
    }

    fn get(&self, type_name: &str) -> Result<Arc<ProviderData>, ProviderError> {
        self.data
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| {
                ProviderError::ProviderMisconfigured(format!(
                    "{} used before the provider was configured",
                    type_name
                ))
            })
    }
}

fn validate_tree(
    schema: &Schema,
    validators: &[Box<dyn ConfigValidator>],
    config: &ValueTree,
) -> Vec<Diagnostic> {
    let mut diagnostics = validation::validate(schema, config);
    diagnostics.extend(validation::validate_config(validators, config));
    diagnostics
}

/// Fill every schema attribute, drop undeclared ones and keep the
/// operator's JSON text wherever the service echoed an equivalent object.
///
/// The service does not distinguish an empty string, set or map from an
/// unset one, so for settable attributes the reference decides which of
/// the two the state records.
pub fn normalize_state(schema: &Schema, reference: Option<&ValueTree>, state: ValueTree) -> ValueTree {
    let mut normalized = ValueTree::new();
    for (name, attr) in &schema.attributes {
        let mut value = state.raw(name).clone();
        if value.is_unknown() {
            value = Dynamic::Null;
        }
        if attr.flags.is_settable() {
            let ours = reference.map(|r| r.raw(name));
            match ours {
                Some(ours) if value.is_null() && ours.is_known_empty() => value = ours.clone(),
                Some(ours) if value.is_known_empty() && ours.is_null() => value = Dynamic::Null,
                _ => {},
            }
        }
        if attr.attr_type == AttributeType::Json {
            if let Some(remote) = value.as_str() {
                let ours = reference
                    .and_then(|r| r.raw(name).as_str())
                    .map(JsonObjectString::new);
                let kept = JsonObjectString::reconcile(ours.as_ref(), JsonObjectString::new(remote));
                value = kept.into_dynamic();
            }
        }
        normalized.insert_raw(name.clone(), value);
    }
    normalized
}

/// Drives one [`Resource`] through the lifecycle protocol.
pub struct ResourceRuntime {
    resource: Arc<dyn Resource>,
    slot: ConfigureSlot,
}

impl std::fmt::Debug for ResourceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRuntime")
            .field("type_name", &self.resource.type_name())
            .finish_non_exhaustive()
    }
}

impl ResourceRuntime {
    /// Wrap a resource.
    pub fn new(resource: Arc<dyn Resource>) -> Self {
        Self {
            resource,
            slot: ConfigureSlot::default(),
        }
    }

    /// The wrapped resource's kind name.
    pub fn type_name(&self) -> &'static str {
        self.resource.type_name()
    }

    /// The wrapped resource's schema.
    pub fn schema(&self) -> Schema {
        self.resource.schema()
    }

    /// Store the provider handle. A missing handle means the provider is not configured yet.
    pub fn configure(&self, handle: Option<Arc<dyn Any + Send + Sync>>) -> Result<(), ProviderError> {
        self.slot.configure(self.type_name(), handle)
    }

    fn data(&self) -> Result<Arc<ProviderData>, ProviderError> {
        self.slot.get(self.type_name())
    }

    /// Schema conformance plus cross-attribute validators.
    pub fn validate(&self, config: &ValueTree) -> Vec<Diagnostic> {
        validate_tree(&self.schema(), &self.resource.config_validators(), config)
    }

    /// Compute the plan. `proposed` of `None` plans a destroy.
    pub async fn plan(
        &self,
        ctx: &Context,
        prior: Option<ValueTree>,
        proposed: Option<ValueTree>,
        config: Option<ValueTree>,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.schema();
        let config = config.unwrap_or_default();

        let planned = proposed
            .as_ref()
            .map(|proposed| plan::default_plan(&schema, prior.as_ref(), proposed, &config));
        let requires_replace = match (&prior, &planned) {
            (Some(prior), Some(planned)) => plan::replace_triggers(&schema, prior, planned),
            _ => Default::default(),
        };

        let mut req = PlanRequest {
            config,
            state: prior,
            plan: planned,
            requires_replace,
            diagnostics: Vec::new(),
        };

        if req.state.is_some() || req.plan.is_some() {
            let data = self.data()?;
            self.resource.modify_plan(ctx, &data, &mut req).await?;
        }

        if req.is_replace() {
            if let Some(planned) = req.plan.as_mut() {
                plan::unknown_computed(&schema, &req.config, planned);
            }
        }

        if self.resource.in_use_gated() && req.removes_existing() {
            if let Some(state) = &req.state {
                if state.raw("in_use") == &Dynamic::Bool(true) {
                    let key = self.resource.display_key(state);
                    let action = if req.is_destroy() { "destroyed" } else { "replaced" };
                    warn!(resource_type = self.type_name(), name = %key, "Refusing to plan removal of in-use object");
                    return Err(ProviderError::InUseImmutable(format!(
                        "{} '{}' is in use and cannot be {}",
                        self.type_name(),
                        key,
                        action
                    )));
                }
            }
        }

        let changes = plan::diff(&schema, req.state.as_ref(), req.plan.as_ref());
        Ok(PlanResult {
            planned_state: req.plan,
            changes,
            requires_replace: req.requires_replace,
            diagnostics: req.diagnostics,
        })
    }

    /// Create the object.
    pub async fn create(&self, ctx: &Context, planned: ValueTree) -> Result<ValueTree, ProviderError> {
        let data = self.data()?;
        let key = self.resource.display_key(&planned);
        debug!(resource_type = self.type_name(), name = %key, "Creating");
        let state = self.resource.create(ctx, &data, &planned).await?;
        info!(resource_type = self.type_name(), name = %key, "Created");
        Ok(normalize_state(&self.schema(), Some(&planned), state))
    }

    /// Refresh the object. `None` means it is gone and leaves state.
    pub async fn read(&self, ctx: &Context, current: ValueTree) -> Result<Option<ValueTree>, ProviderError> {
        let data = self.data()?;
        let key = self.resource.display_key(&current);
        match self.resource.read(ctx, &data, &current).await? {
            Some(state) => Ok(Some(normalize_state(&self.schema(), Some(&current), state))),
            None => {
                warn!(resource_type = self.type_name(), name = %key, "Object no longer exists, removing from state");
                Ok(None)
            },
        }
    }

    /// Update the object in place.
    pub async fn update(
        &self,
        ctx: &Context,
        prior: ValueTree,
        planned: ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let data = self.data()?;
        let key = self.resource.display_key(&prior);
        debug!(resource_type = self.type_name(), name = %key, "Updating");
        let schema = self.schema();
        match self.resource.update(ctx, &data, &prior, &planned).await {
            Ok(state) => {
                info!(resource_type = self.type_name(), name = %key, "Updated");
                Ok(normalize_state(&schema, Some(&planned), state))
            },
            Err(ProviderError::PartiallyApplied { message, state }) => {
                let state = match ValueTree::from_dynamic(*state) {
                    Ok(tree) => normalize_state(&schema, Some(&planned), tree).into_dynamic(),
                    Err(_) => Dynamic::Null,
                };
                Err(ProviderError::PartiallyApplied {
                    message,
                    state: Box::new(state),
                })
            },
            Err(e) => Err(e),
        }
    }

    /// Delete the object, then wait out the kind's settling interval.
    pub async fn delete(&self, ctx: &Context, current: ValueTree) -> Result<(), ProviderError> {
        let data = self.data()?;
        let key = self.resource.display_key(&current);
        debug!(resource_type = self.type_name(), name = %key, "Deleting");
        match self.resource.delete(ctx, &data, &current).await {
            Ok(()) => {
                info!(resource_type = self.type_name(), name = %key, "Deleted");
                ctx.quiesce(self.resource.post_delete_delay()).await
            },
            Err(ProviderError::NotFound(_)) => {
                info!(resource_type = self.type_name(), name = %key, "Already deleted");
                Ok(())
            },
            Err(e) => Err(e),
        }
    }

    /// Seed state from an import identifier.
    pub fn import(&self, id: &str) -> Result<ValueTree, ProviderError> {
        let seeded = self.resource.import_state(id)?;
        Ok(normalize_state(&self.schema(), None, seeded))
    }
}

/// Drives one [`DataSource`].
pub struct DataSourceRuntime {
    source: Arc<dyn DataSource>,
    slot: ConfigureSlot,
}

impl std::fmt::Debug for DataSourceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSourceRuntime")
            .field("type_name", &self.source.type_name())
            .finish_non_exhaustive()
    }
}

impl DataSourceRuntime {
    /// Wrap a data source.
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self {
            source,
            slot: ConfigureSlot::default(),
        }
    }

    /// The wrapped data source's kind name.
    pub fn type_name(&self) -> &'static str {
        self.source.type_name()
    }

    /// The wrapped data source's schema.
    pub fn schema(&self) -> Schema {
        self.source.schema()
    }

    /// Store the provider handle. A missing handle means the provider is not configured yet.
    pub fn configure(&self, handle: Option<Arc<dyn Any + Send + Sync>>) -> Result<(), ProviderError> {
        self.slot.configure(self.type_name(), handle)
    }

    /// Schema conformance plus cross-attribute validators.
    pub fn validate(&self, config: &ValueTree) -> Vec<Diagnostic> {
        validate_tree(&self.schema(), &self.source.config_validators(), config)
    }

    /// Read the object.
    pub async fn read(&self, ctx: &Context, config: ValueTree) -> Result<ValueTree, ProviderError> {
        let data = self.slot.get(self.type_name())?;
        let state = self.source.read(ctx, &data, &config).await?;
        Ok(normalize_state(&self.schema(), Some(&config), state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    #[test]
    fn test_configure_without_handle_is_ok() {
        let slot = ConfigureSlot::default();
        assert!(slot.configure("echostream_kms_key", None).is_ok());
        assert!(matches!(
            slot.get("echostream_kms_key"),
            Err(ProviderError::ProviderMisconfigured(_))
        ));
    }

    #[test]
    fn test_configure_wrong_handle() {
        let slot = ConfigureSlot::default();
        let handle: Arc<dyn Any + Send + Sync> = Arc::new(42_u32);
        assert!(matches!(
            slot.configure("echostream_kms_key", Some(handle)),
            Err(ProviderError::ProviderMisconfigured(_))
        ));
    }

    #[test]
    fn test_normalize_state_keeps_operator_json() {
        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("config", Attribute::json(crate::schema::AttributeFlags::optional()));
        let planned = ValueTree::from_json(json!({"name": "n", "config": "{\"b\": 1, \"a\": 2}"})).unwrap();
        let remote = ValueTree::from_json(json!({"name": "n", "config": "{\"a\":2,\"b\":1}", "extra": 1})).unwrap();

        let state = normalize_state(&schema, Some(&planned), remote);
        assert_eq!(state.raw("config").as_str(), Some("{\"b\": 1, \"a\": 2}"));
        assert!(state.iter().all(|(name, _)| name != "extra"));

        let drifted = ValueTree::from_json(json!({"name": "n", "config": "{\"a\":3}"})).unwrap();
        let state = normalize_state(&schema, Some(&planned), drifted);
        assert_eq!(state.raw("config").as_str(), Some("{\"a\":3}"));
    }

    #[test]
    fn test_normalize_state_keeps_empty_values() {
        use crate::schema::{AttributeFlags, AttributeType};

        let schema = Schema::v0()
            .with_attribute("name", Attribute::required_string())
            .with_attribute("config", Attribute::json(AttributeFlags::optional()))
            .with_attribute(
                "requirements",
                Attribute::new(AttributeType::set(AttributeType::String), AttributeFlags::optional()),
            )
            .with_attribute("arn", Attribute::computed_string());
        let remote = ValueTree::from_json(json!({"name": "n", "config": null, "requirements": null, "arn": null})).unwrap();

        let planned = ValueTree::from_json(json!({"name": "n", "config": "", "requirements": [], "arn": ""})).unwrap();
        let state = normalize_state(&schema, Some(&planned), remote.clone());
        assert_eq!(state.raw("config").as_str(), Some(""));
        assert_eq!(state.raw("requirements"), &Dynamic::Set(vec![]));
        assert!(state.raw("arn").is_null());

        let unset = ValueTree::from_json(json!({"name": "n"})).unwrap();
        let echoed = ValueTree::from_json(json!({"name": "n", "requirements": []})).unwrap();
        let state = normalize_state(&schema, Some(&unset), echoed);
        assert!(state.raw("requirements").is_null());
        assert!(state.raw("config").is_null());
    }
}
