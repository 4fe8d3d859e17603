//! Read-only kinds.
//!
//! Data sources expose objects the provider never manages, including the
//! system-owned message types, functions and emitter nodes every tenant has.

mod emitter;

use std::sync::Arc;

use async_trait::async_trait;

pub use emitter::EmitterNodeDataSource;

use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::{function, message_type, tenant};
use crate::graphql::types::Function;
use crate::resource::{DataSource, ProviderData};
use crate::resources::message_type::state_of as message_type_state;
use crate::resources::requirements_out;
use crate::resources::tenant::state_of as tenant_state;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::value::ValueTree;

/// Every read-only kind, in registration order.
pub fn all() -> Vec<Arc<dyn DataSource>> {
    let mut all: Vec<Arc<dyn DataSource>> = vec![
        Arc::new(MessageTypeDataSource),
        Arc::new(FunctionDataSource),
        Arc::new(TenantDataSource),
    ];
    all.extend(
        EmitterNodeDataSource::all()
            .into_iter()
            .map(|e| Arc::new(e) as Arc<dyn DataSource>),
    );
    all
}

fn lookup_name() -> Attribute {
    Attribute::required_string().with_description("The name to look up.")
}

fn computed(attr_type: AttributeType, description: &str) -> Attribute {
    Attribute::new(attr_type, AttributeFlags::computed()).with_description(description)
}

fn not_found(what: &str, name: &str) -> ProviderError {
    ProviderError::NotFound(format!("{} '{}' does not exist", what, name))
}

// =============================================================================
// Message type
// =============================================================================

/// Any message type, system types included.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageTypeDataSource;

#[async_trait]
impl DataSource for MessageTypeDataSource {
    fn type_name(&self) -> &'static str {
        "message_type"
    }

    fn schema(&self) -> Schema {
        let string = AttributeType::String;
        Schema::v0()
            .with_description("Look up a message type, including the built-in system types.")
            .with_attribute("name", lookup_name())
            .with_attribute("auditor", computed(string.clone(), "The auditor code."))
            .with_attribute("bitmapper_template", computed(string.clone(), "The bitmapper template."))
            .with_attribute("description", computed(string.clone(), "The description."))
            .with_attribute("in_use", computed(AttributeType::Bool, "Whether anything uses the type."))
            .with_attribute("processor_template", computed(string.clone(), "The processor template."))
            .with_attribute("readme", computed(string.clone(), "The readme."))
            .with_attribute(
                "requirements",
                computed(AttributeType::set(string.clone()), "Python requirements."),
            )
            .with_attribute("sample_message", computed(string, "A sample message."))
            .with_attribute("system", computed(AttributeType::Bool, "Whether the type is built in."))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        config: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let name: String = config.required("name")?;
        let found = message_type::get_message_type(ctx, &data.client, &data.tenant, &name)
            .await?
            .ok_or_else(|| not_found("message type", &name))?;
        let system = found.is_system();
        let mut state = message_type_state(found);
        state.set_known("system", system);
        Ok(state)
    }
}

// =============================================================================
// Function
// =============================================================================

/// Any bitmapper or processor function, system functions included.
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionDataSource;

fn function_state(function: Function, name: &str) -> Result<ValueTree, ProviderError> {
    let mut state = ValueTree::new();
    state.set_known("name", name.to_string());
    let system = match function {
        Function::BitmapperFunction(f) => {
            state.set_known("argument_message_type", f.argument_message_type.name);
            state.set_known("code", f.code);
            state.set_optional("description", f.description);
            state.set_known("function_type", "bitmapper".to_string());
            state.set_known("in_use", f.in_use);
            state.set_optional("readme", f.readme);
            requirements_out(&mut state, f.requirements);
            f.system
        },
        Function::ProcessorFunction(f) => {
            state.set_known("argument_message_type", f.argument_message_type.name);
            state.set_known("code", f.code);
            state.set_optional("description", f.description);
            state.set_known("function_type", "processor".to_string());
            state.set_known("in_use", f.in_use);
            state.set_optional("readme", f.readme);
            requirements_out(&mut state, f.requirements);
            state.set_optional("return_message_type", f.return_message_type.map(|r| r.name));
            f.system
        },
        Function::Unsupported => {
            return Err(ProviderError::KindMismatch {
                name: name.to_string(),
                expected: "a bitmapper or processor function".to_string(),
                actual: "an unsupported function type".to_string(),
            });
        },
    };
    state.set_known("system", system.unwrap_or(false));
    Ok(state)
}

#[async_trait]
impl DataSource for FunctionDataSource {
    fn type_name(&self) -> &'static str {
        "function"
    }

    fn schema(&self) -> Schema {
        let string = AttributeType::String;
        Schema::v0()
            .with_description("Look up a function, including the built-in system functions.")
            .with_attribute("name", lookup_name())
            .with_attribute(
                "argument_message_type",
                computed(string.clone(), "The message type the function receives."),
            )
            .with_attribute("code", computed(string.clone(), "The function's source."))
            .with_attribute("description", computed(string.clone(), "The description."))
            .with_attribute(
                "function_type",
                computed(string.clone(), "Either `bitmapper` or `processor`."),
            )
            .with_attribute("in_use", computed(AttributeType::Bool, "Whether anything uses the function."))
            .with_attribute("readme", computed(string.clone(), "The readme."))
            .with_attribute(
                "requirements",
                computed(AttributeType::set(string.clone()), "Python requirements."),
            )
            .with_attribute(
                "return_message_type",
                computed(string, "The message type a processor emits."),
            )
            .with_attribute("system", computed(AttributeType::Bool, "Whether the function is built in."))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        config: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let name: String = config.required("name")?;
        let found = function::get_function(ctx, &data.client, &data.tenant, &name)
            .await?
            .ok_or_else(|| not_found("function", &name))?;
        function_state(found, &name)
    }
}

// =============================================================================
// Tenant
// =============================================================================

/// The provider's tenant.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantDataSource;

#[async_trait]
impl DataSource for TenantDataSource {
    fn type_name(&self) -> &'static str {
        "tenant"
    }

    fn schema(&self) -> Schema {
        let string = AttributeType::String;
        Schema::v0()
            .with_description("Read the tenant the provider is configured for.")
            .with_attribute("name", computed(string.clone(), "The tenant's name."))
            .with_attribute("active", computed(AttributeType::Bool, "Whether the tenant is active."))
            .with_attribute("audit", computed(AttributeType::Bool, "Whether auditing is enabled."))
            .with_attribute("config", Attribute::json(AttributeFlags::computed()).with_description("The tenant's JSON config."))
            .with_attribute("description", computed(string.clone(), "The description."))
            .with_attribute("region", computed(string.clone(), "The AWS region."))
            .with_attribute("table", computed(string, "The tenant's table."))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _config: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let found = tenant::get_tenant(ctx, &data.client, &data.tenant)
            .await?
            .ok_or_else(|| not_found("tenant", &data.tenant))?;
        Ok(tenant_state(found))
    }
}
