//! SNS topics and subscriptions for scaling notifications

use crate::aws::context::AwsContext;
use crate::aws::error::{build_error, required, sdk_error, unsupported};
use crate::provider::{
    LookupFilter, ProviderError, ResourceRecord, ResourceTags, SubscriptionRequest, TopicRequest,
};
use archforge_common::ResourceKind;
use aws_sdk_sns::Client;
use aws_sdk_sns::types::{Subscription, Tag};
use tracing::{debug, info};

/// SNS client
pub struct SnsClient {
    client: Client,
}

fn sns_tags(operation: &'static str, tags: &[(String, String)]) -> Result<Vec<Tag>, ProviderError> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder()
                .key(k)
                .value(v)
                .build()
                .map_err(build_error(operation))
        })
        .collect()
}

/// Topic ARNs end in `:<topic name>`
fn topic_name(arn: &str) -> Option<&str> {
    arn.rsplit_once(':').map(|(_, name)| name)
}

fn subscription_record(subscription: &Subscription) -> Option<ResourceRecord> {
    let mut record = ResourceRecord::new(subscription.subscription_arn()?);
    if let Some(protocol) = subscription.protocol() {
        record = record.with_field("protocol", protocol);
    }
    if let Some(endpoint) = subscription.endpoint() {
        record = record.with_field("endpoint", endpoint);
    }
    Some(record)
}

impl SnsClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sns_client(),
        }
    }

    /// Create a topic; topics are identified by ARN
    pub async fn create_topic(
        &self,
        request: &TopicRequest,
        tags: &ResourceTags,
    ) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "CreateTopic";
        let response = self
            .client
            .create_topic()
            .name(&request.name)
            .attributes("DisplayName", &request.display_name)
            .set_tags(Some(sns_tags(OP, &tags.pairs())?))
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let arn = required(response.topic_arn(), OP, "topic_arn")?;
        info!(name = %request.name, arn = %arn, "Created topic");
        Ok(ResourceRecord::new(arn).with_field("name", &request.name))
    }

    /// Find a topic by name (scanning every topic page) or check one ARN
    pub async fn describe_topics(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        match by {
            LookupFilter::NativeName(name) => {
                let mut found = Vec::new();
                let mut next_token: Option<String> = None;
                loop {
                    let response = self
                        .client
                        .list_topics()
                        .set_next_token(next_token.take())
                        .send()
                        .await
                        .map_err(sdk_error("ListTopics"))?;
                    found.extend(
                        response
                            .topics()
                            .iter()
                            .filter_map(|t| t.topic_arn())
                            .filter(|arn| topic_name(arn) == Some(name.as_str()))
                            .map(|arn| ResourceRecord::new(arn).with_field("name", name)),
                    );
                    match response.next_token() {
                        Some(token) => next_token = Some(token.to_string()),
                        None => break,
                    }
                }
                Ok(found)
            }
            LookupFilter::Id(arn) => {
                self.client
                    .get_topic_attributes()
                    .topic_arn(arn)
                    .send()
                    .await
                    .map_err(sdk_error("GetTopicAttributes"))?;
                let mut record = ResourceRecord::new(arn);
                if let Some(name) = topic_name(arn) {
                    record = record.with_field("name", name);
                }
                Ok(vec![record])
            }
            _ => Err(unsupported(ResourceKind::Topic)),
        }
    }

    /// Delete a topic; any remaining subscriptions go with it
    pub async fn delete_topic(&self, arn: &str) -> Result<(), ProviderError> {
        self.client
            .delete_topic()
            .topic_arn(arn)
            .send()
            .await
            .map_err(sdk_error("DeleteTopic"))?;
        info!(arn = %arn, "Deleted topic");
        Ok(())
    }

    pub async fn tag_topic(&self, arn: &str, tags: &[(String, String)]) -> Result<(), ProviderError> {
        const OP: &str = "TagResource";
        self.client
            .tag_resource()
            .resource_arn(arn)
            .set_tags(Some(sns_tags(OP, tags)?))
            .send()
            .await
            .map_err(sdk_error(OP))?;
        Ok(())
    }

    /// Subscribe an endpoint; the ARN is returned even before confirmation
    pub async fn subscribe(&self, request: &SubscriptionRequest) -> Result<ResourceRecord, ProviderError> {
        const OP: &str = "Subscribe";
        let response = self
            .client
            .subscribe()
            .topic_arn(&request.topic_arn)
            .protocol(&request.protocol)
            .endpoint(&request.endpoint)
            .return_subscription_arn(true)
            .send()
            .await
            .map_err(sdk_error(OP))?;

        let arn = required(response.subscription_arn(), OP, "subscription_arn")?;
        info!(
            topic = %request.topic_arn,
            protocol = %request.protocol,
            endpoint = %request.endpoint,
            "Subscribed endpoint"
        );
        Ok(ResourceRecord::new(arn)
            .with_field("protocol", &request.protocol)
            .with_field("endpoint", &request.endpoint))
    }

    /// Subscriptions of a topic (by topic ARN), or one subscription by ARN.
    ///
    /// Unconfirmed subscriptions are listed with `PendingConfirmation` in
    /// place of an ARN.
    pub async fn describe_subscriptions(
        &self,
        by: &LookupFilter,
    ) -> Result<Vec<ResourceRecord>, ProviderError> {
        match by {
            LookupFilter::Parent(topic_arn) => {
                let mut found = Vec::new();
                let mut next_token: Option<String> = None;
                loop {
                    let response = self
                        .client
                        .list_subscriptions_by_topic()
                        .topic_arn(topic_arn)
                        .set_next_token(next_token.take())
                        .send()
                        .await
                        .map_err(sdk_error("ListSubscriptionsByTopic"))?;
                    found.extend(response.subscriptions().iter().filter_map(subscription_record));
                    match response.next_token() {
                        Some(token) => next_token = Some(token.to_string()),
                        None => break,
                    }
                }
                debug!(topic = %topic_arn, count = found.len(), "Listed subscriptions");
                Ok(found)
            }
            LookupFilter::Id(arn) => {
                let response = self
                    .client
                    .get_subscription_attributes()
                    .subscription_arn(arn)
                    .send()
                    .await
                    .map_err(sdk_error("GetSubscriptionAttributes"))?;
                let mut record = ResourceRecord::new(arn);
                if let Some(endpoint) = response.attributes().and_then(|a| a.get("Endpoint")) {
                    record = record.with_field("endpoint", endpoint);
                }
                Ok(vec![record])
            }
            _ => Err(unsupported(ResourceKind::Subscription)),
        }
    }

    pub async fn unsubscribe(&self, arn: &str) -> Result<(), ProviderError> {
        self.client
            .unsubscribe()
            .subscription_arn(arn)
            .send()
            .await
            .map_err(sdk_error("Unsubscribe"))?;
        info!(arn = %arn, "Unsubscribed endpoint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name_from_arn() {
        assert_eq!(
            topic_name("arn:aws:sns:us-east-1:123456789012:web-scale-up"),
            Some("web-scale-up")
        );
        assert_eq!(topic_name("web-scale-up"), None);
    }

    #[test]
    fn test_pending_subscription_keeps_placeholder_id() {
        let subscription = Subscription::builder()
            .subscription_arn("PendingConfirmation")
            .protocol("email")
            .endpoint("ops@example.com")
            .build();
        let record = subscription_record(&subscription).unwrap();
        assert_eq!(record.id, crate::pipeline::PENDING_SUBSCRIPTION);
        assert_eq!(record.field("endpoint"), Some("ops@example.com"));
    }
}
