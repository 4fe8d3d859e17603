use async_trait::async_trait;

use super::{description, in_use, name_attribute, name_of};
use crate::context::Context;
use crate::error::ProviderError;
use crate::graphql::operations::kms_key::{self, KmsKeyInput};
use crate::graphql::types::KmsKey;
use crate::resource::{ProviderData, Resource};
use crate::schema::{Attribute, Schema};
use crate::value::ValueTree;

/// A tenant KMS key encrypting edge queues.
#[derive(Debug, Clone, Copy, Default)]
pub struct KmsKeyResource;

fn input_of(plan: &ValueTree) -> Result<KmsKeyInput, ProviderError> {
    Ok(KmsKeyInput {
        description: plan.optional("description")?,
    })
}

fn state_of(key: KmsKey) -> ValueTree {
    let mut state = ValueTree::new();
    state.set_known("name", key.name);
    state.set_known("arn", key.arn);
    state.set_optional("description", key.description);
    state.set_known("in_use", key.in_use);
    state
}

#[async_trait]
impl Resource for KmsKeyResource {
    fn type_name(&self) -> &'static str {
        "kms_key"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("A KMS key used to encrypt messages on edges.")
            .with_attribute("name", name_attribute("KMS key"))
            .with_attribute(
                "arn",
                Attribute::computed_string()
                    .use_state_for_unknown()
                    .with_description("The key's ARN."),
            )
            .with_attribute("description", description())
            .with_attribute("in_use", in_use())
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
        let key = kms_key::create_kms_key(ctx, &data.client, &data.tenant, &name_of(plan)?, &input_of(plan)?)
            .await?;
        Ok(state_of(key))
    }

    async fn read(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<Option<ValueTree>, ProviderError> {
        let key = kms_key::get_kms_key(ctx, &data.client, &data.tenant, &name_of(state)?).await?;
        Ok(key.map(state_of))
    }

    async fn update(
        &self,
        ctx: &Context,
        data: &ProviderData,
        _prior: &ValueTree,
        plan: &ValueTree,
    ) -> Result<ValueTree, ProviderError> {
        let key = kms_key::update_kms_key(ctx, &data.client, &data.tenant, &name_of(plan)?, &input_of(plan)?)
            .await?;
        Ok(state_of(key))
    }

    async fn delete(
        &self,
        ctx: &Context,
        data: &ProviderData,
        state: &ValueTree,
    ) -> Result<(), ProviderError> {
        kms_key::delete_kms_key(ctx, &data.client, &data.tenant, &name_of(state)?).await
    }
}
