//! Bitmapper and processor functions.
//!
//! Both kinds share the `GetFunction` lookup, so reads check the concrete
//! variant before writing state.

use async_trait::async_trait;

use super::{
    description, in_use, name_attribute, name_of, optional_reference, ref_name, reference,
    requirements, requirements_in, requirements_out,
};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::function::{
    self, BitmapperFunctionCreate, FunctionInput, ProcessorFunctionCreate,
};
use crate::graphql::operations::kind_error;
use crate::graphql::types::{BitmapperFunction, Function, ProcessorFunction};
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::value::ValueTree;

/// A function computing a routing bitmap for a message.
#[derive(Debug, Clone, Copy, Default)]
pub struct BitmapperFunctionResource;

/// A function transforming messages inside a node.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessorFunctionResource;

fn common_schema(what: &str) -> Schema {
    Schema::v0()
        .with_attribute("name", name_attribute(what))
        .with_attribute(
            "argument_message_type",
            reference("The message type the function receives.").requires_replace(),
        )
        .with_attribute(
            "code",
            Attribute::required_string().with_description("The function's Python source."),
        )
        .with_attribute("description", description())
        .with_attribute("in_use", in_use())
        .with_attribute(
            "readme",
            Attribute::optional_string().with_description("Markdown documentation for the function."),
        )
        .with_attribute("requirements", requirements())
}

fn input_of(plan: &ValueTree) -> Result<FunctionInput, ProviderError> {
    Ok(FunctionInput {
        code: plan.optional("code")?,
        description: plan.optional("description")?,
        readme: plan.optional("readme")?,
        requirements: requirements_in(plan)?,
    })
}

fn system_owned(name: &str) -> ProviderError {
    ProviderError::SystemOwned(format!("function '{}' is system-managed and cannot be managed", name))
}

fn bitmapper_state(f: BitmapperFunction) -> Result<ValueTree, ProviderError> {
    if f.system.unwrap_or(false) {
        return Err(system_owned(&f.name));
    }
    let mut state = ValueTree::new();
    state.set_known("name", f.name);
    state.set_known("argument_message_type", f.argument_message_type.name);
    state.set_known("code", f.code);
    state.set_optional("description", f.description);
    state.set_known("in_use", f.in_use);
    state.set_optional("readme", f.readme);
    requirements_out(&mut state, f.requirements);
    Ok(state)
}

fn processor_state(f: ProcessorFunction) -> Result<ValueTree, ProviderError> {
    if f.system.unwrap_or(false) {
        return Err(system_owned(&f.name));
    }
    let mut state = ValueTree::new();
    state.set_known("name", f.name);
    state.set_known("argument_message_type", f.argument_message_type.name);
    state.set_known("code", f.code);
    state.set_optional("description", f.description);
    state.set_known("in_use", f.in_use);
    state.set_optional("readme", f.readme);
    requirements_out(&mut state, f.requirements);
    state.set_optional("return_message_type", ref_name(f.return_message_type));
    Ok(state)
}

/// Function state from a polymorphic lookup, if it is of the kind `expected`.
pub(crate) fn function_state(name: &str, function: Function, expected: &str) -> Result<ValueTree, ProviderError> {
    match function {
        Function::BitmapperFunction(f) if expected == "BitmapperFunction" => bitmapper_state(f),
        Function::ProcessorFunction(f) if expected == "ProcessorFunction" => processor_state(f),
        other if other.is_system() => Err(system_owned(name)),
        other => Err(kind_error(name, expected, other.kind())),
    }
}

#[async_trait]
impl Resource for BitmapperFunctionResource {
    fn type_name(&self) -> &'static str {
        "bitmapper_function"
    }

    fn schema(&self) -> Schema {
        common_schema("bitmapper function")
            .with_description("A bitmapper function, used by router nodes to route messages.")
    }

    fn in_use_gated(&self) -> bool {
        true
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = BitmapperFunctionCreate {
            argument_message_type: plan.required("argument_message_type")?,
            input: input_of(plan)?,
        };
        let created =
            function::create_bitmapper_function(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        bitmapper_state(created)
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let name = name_of(state)?;
        function::get_function(ctx, &data.client, &data.tenant, &name)
            .await?
            .map(|f| function_state(&name, f, "BitmapperFunction"))
            .transpose()
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            function::update_bitmapper_function(ctx, &data.client, &data.tenant, &name_of(plan)?, &input_of(plan)?)
                .await?;
        bitmapper_state(updated)
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        function::delete_function(ctx, &data.client, &data.tenant, &name_of(state)?, "BitmapperFunction").await
    }
}

#[async_trait]
impl Resource for ProcessorFunctionResource {
    fn type_name(&self) -> &'static str {
        "processor_function"
    }

    fn schema(&self) -> Schema {
        common_schema("processor function")
            .with_description("A processor function, used by processor nodes to transform messages.")
            .with_attribute(
                "return_message_type",
                optional_reference("The message type the function emits, if any.").requires_replace(),
            )
    }

    fn in_use_gated(&self) -> bool {
        true
    }

    async fn create(
        &self,
        ctx: &Context,
        data: &ProviderData,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let input = ProcessorFunctionCreate {
            argument_message_type: plan.required("argument_message_type")?,
            return_message_type: plan.optional("return_message_type")?,
            input: input_of(plan)?,
        };
        let created =
            function::create_processor_function(ctx, &data.client, &data.tenant, &name_of(plan)?, &input).await?;
        processor_state(created)
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let name = name_of(state)?;
        function::get_function(ctx, &data.client, &data.tenant, &name)
            .await?
            .map(|f| function_state(&name, f, "ProcessorFunction"))
            .transpose()
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let updated =
            function::update_processor_function(ctx, &data.client, &data.tenant, &name_of(plan)?, &input_of(plan)?)
                .await?;
        processor_state(updated)
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        function::delete_function(ctx, &data.client, &data.tenant, &name_of(state)?, "ProcessorFunction").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_plan_replaces, FakeBackends};
    use crate::value::Dynamic;
    use serde_json::json;

    fn processor(name: &str) -> serde_json::Value {
        json!({
            "__typename": "ProcessorFunction",
            "name": name,
            "argument_message_type": {"name": "echo.text"},
            "code": "def processor(*, message, **kwargs): return message",
            "description": null,
            "in_use": false,
            "readme": null,
            "requirements": null,
            "return_message_type": {"name": "echo.json"},
            "system": false,
        })
    }

    #[tokio::test]
    async fn test_read_processor_function() {
        let backends = FakeBackends::new();
        backends.graphql.returns("GetFunction", processor("p1"));
        let state = ValueTree::from_json(json!({"name": "p1"})).unwrap();

        let read = ProcessorFunctionResource
            .read(&Context::new(), &backends.provider_data(), &state)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.raw("argument_message_type").as_str(), Some("echo.text"));
        assert_eq!(read.raw("return_message_type").as_str(), Some("echo.json"));
        assert_eq!(read.raw("in_use"), &Dynamic::Bool(false));
    }

    #[tokio::test]
    async fn test_read_wrong_kind_is_kind_mismatch() {
        let backends = FakeBackends::new();
        backends.graphql.returns("GetFunction", processor("p1"));
        let state = ValueTree::from_json(json!({"name": "p1"})).unwrap();

        let err = BitmapperFunctionResource
            .read(&Context::new(), &backends.provider_data(), &state)
            .await
            .unwrap_err();
        match err {
            ProviderError::KindMismatch { expected, actual, .. } => {
                assert_eq!(expected, "BitmapperFunction");
                assert_eq!(actual, "ProcessorFunction");
            },
            other => panic!("expected KindMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_system_function_is_system_owned() {
        let backends = FakeBackends::new();
        let mut remote = processor("echo.passthrough");
        remote["system"] = json!(true);
        backends.graphql.returns("GetFunction", remote);
        let state = ValueTree::from_json(json!({"name": "echo.passthrough"})).unwrap();

        let err = ProcessorFunctionResource
            .read(&Context::new(), &backends.provider_data(), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::SystemOwned(_)));
    }

    #[tokio::test]
    async fn test_changing_return_type_replaces() {
        let backends = FakeBackends::new();
        let tester = crate::testing::ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();

        let prior = processor_state(serde_json::from_value(processor("p1")).unwrap()).unwrap();
        let plan = tester
            .plan_update(
                "echostream_processor_function",
                prior,
                json!({
                    "name": "p1",
                    "argument_message_type": "echo.text",
                    "code": "def processor(*, message, **kwargs): return message",
                    "return_message_type": "echo.text",
                }),
            )
            .await
            .unwrap();
        assert_plan_replaces(&plan, "return_message_type");
    }

    #[tokio::test]
    async fn test_delete_checks_kind() {
        let backends = FakeBackends::new();
        backends.graphql.returns(
            "DeleteFunction",
            json!({"__typename": "ProcessorFunction", "Delete": true}),
        );
        let state = ValueTree::from_json(json!({"name": "p1"})).unwrap();
        let err = BitmapperFunctionResource
            .delete(&Context::new(), &backends.provider_data(), &state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::KindMismatch { .. }));
    }
}
