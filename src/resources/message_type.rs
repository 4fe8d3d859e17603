use async_trait::async_trait;

use super::{description, in_use, name_attribute, name_of, requirements, requirements_in, requirements_out};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::message_type::{self, MessageTypeInput};
use crate::graphql::types::MessageType;
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::value::ValueTree;

/// A message type: the schema and tooling shared by everything that
/// sends or receives its messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageTypeResource;

fn input_of(plan: &ValueTree) -> Result<MessageTypeInput, ProviderError> {
    Ok(MessageTypeInput {
        auditor: plan.optional("auditor")?,
        bitmapper_template: plan.optional("bitmapper_template")?,
        description: plan.optional("description")?,
        processor_template: plan.optional("processor_template")?,
        readme: plan.optional("readme")?,
        requirements: requirements_in(plan)?,
        sample_message: plan.optional("sample_message")?,
    })
}

/// System types are readable but never managed.
fn managed(message_type: MessageType) -> Result<MessageType, ProviderError> {
    if message_type.is_system() {
        return Err(ProviderError::SystemOwned(format!(
            "message type '{}' is system-managed and cannot be managed",
            message_type.name
        )));
    }
    Ok(message_type)
}

pub(crate) fn state_of(message_type: MessageType) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", message_type.name);
    state.set_known("auditor", message_type.auditor);
    state.set_known("bitmapper_template", message_type.bitmapper_template);
    state.set_optional("description", message_type.description);
    state.set_known("in_use", message_type.in_use);
    state.set_known("processor_template", message_type.processor_template);
    state.set_optional("readme", message_type.readme);
    requirements_out(&mut state, message_type.requirements);
    state.set_known("sample_message", message_type.sample_message);
    state
}

#[async_trait]
impl Resource for MessageTypeResource {
    fn type_name(&self) -> &'static str {
        "message_type"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A message type.")
            .with_attribute("name", name_attribute("message type"))
            .with_attribute(
                "auditor",
                Attribute::required_string()
                    .with_description("Python code returning the auditable fields of a message."),
            )
            .with_attribute(
                "bitmapper_template",
                Attribute::required_string()
                    .with_description("Python template used when writing bitmappers for this type."),
            )
            .with_attribute("description", description())
            .with_attribute("in_use", in_use())
            .with_attribute(
                "processor_template",
                Attribute::required_string()
                    .with_description("Python template used when writing processors for this type."),
            )
            .with_attribute(
                "readme",
                Attribute::optional_string().with_description("Markdown documentation for the type."),
            )
            .with_attribute("requirements", requirements())
            .with_attribute(
                "sample_message",
                Attribute::required_string().with_description("An example message of this type."),
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
        let name = name_of(plan)?;
        let created =
            message_type::create_message_type(ctx, &data.client, &data.tenant, &name, &input_of(plan)?).await?;
        Ok(state_of(created))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let name = name_of(state)?;
        match message_type::get_message_type(ctx, &data.client, &data.tenant, &name).await? {
            Some(found) => Ok(Some(state_of(managed(found)?))),
            None => Ok(None),
        }
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let name = name_of(plan)?;
        let updated =
            message_type::update_message_type(ctx, &data.client, &data.tenant, &name, &input_of(plan)?).await?;
        Ok(state_of(managed(updated)?))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        message_type::delete_message_type(ctx, &data.client, &data.tenant, &name_of(state)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_plan_replaces, FakeBackends, ProviderTester};
    use serde_json::json;

    const KIND: &str = "echostream_message_type";

    fn remote(name: &str, in_use: bool, system: bool) -> serde_json::Value {
        json!({
            "name": name,
            "auditor": "def auditor(*, message, **kwargs): return {}",
            "bitmapper_template": "def bitmapper(*, message, **kwargs): pass",
            "description": null,
            "in_use": in_use,
            "processor_template": "def processor(*, message, **kwargs): pass",
            "readme": null,
            "requirements": [],
            "sample_message": "{}",
            "system": system,
        })
    }

    fn state(name: &str, in_use: bool) -> ValueTree {
        state_of(serde_json::from_value(remote(name, in_use, false)).unwrap())
    }

    async fn configured() -> (FakeBackends, ProviderTester<crate::provider::EchoStreamProvider>) {
        let backends = FakeBackends::new();
        let tester = ProviderTester::new(backends.provider());
        tester.configure(backends.provider_config()).await.unwrap();
        (backends, tester)
    }

    #[tokio::test]
    async fn test_in_use_message_type_destroy_refused() {
        let (backends, tester) = configured().await;
        let err = tester.plan_delete(KIND, state("msg1", true)).await.unwrap_err();
        match err {
            ProviderError::InUseImmutable(message) => assert!(message.contains("msg1")),
            other => panic!("expected InUseImmutable, got {:?}", other),
        }
        assert_eq!(backends.graphql.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_in_use_message_type_replace_refused() {
        let (_backends, tester) = configured().await;
        let mut config = remote("msg2", true, false);
        config["name"] = json!("msg2-renamed");
        config.as_object_mut().unwrap().remove("in_use");
        config.as_object_mut().unwrap().remove("system");
        config["requirements"] = json!(null);

        let err = tester
            .plan_update(KIND, state("msg2", true), config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InUseImmutable(ref m) if m.contains("replaced")));
    }

    #[tokio::test]
    async fn test_unused_message_type_rename_replaces() {
        let (_backends, tester) = configured().await;
        let mut config = remote("msg3-renamed", false, false);
        config.as_object_mut().unwrap().remove("in_use");
        config.as_object_mut().unwrap().remove("system");
        config["requirements"] = json!(null);

        let plan = tester.plan_update(KIND, state("msg3", false), config).await.unwrap();
        assert_plan_replaces(&plan, "name");
        assert!(plan.planned_state.unwrap().raw("in_use").is_unknown());
    }

    #[tokio::test]
    async fn test_system_message_type_is_system_owned() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("GetMessageType", remote("echo.text", false, true));
        let err = tester.read(KIND, state("echo.text", false)).await.unwrap_err();
        assert!(matches!(err, ProviderError::SystemOwned(_)));
    }

    #[tokio::test]
    async fn test_create_sends_requirements_as_list() {
        let (backends, tester) = configured().await;
        backends.graphql.returns("CreateMessageType", remote("msg4", false, false));
        let mut config = remote("msg4", false, false);
        config.as_object_mut().unwrap().remove("in_use");
        config.as_object_mut().unwrap().remove("system");
        config["requirements"] = json!(["requests"]);

        let plan = tester.plan_create(KIND, config).await.unwrap();
        tester.create(KIND, plan.planned_state.unwrap()).await.unwrap();
        let call = backends.graphql.last_call("CreateMessageType").unwrap();
        assert_eq!(call.variables["requirements"], json!(["requests"]));
        assert_eq!(call.variables["tenant"], json!("test-tenant"));
    }
}
