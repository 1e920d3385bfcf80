//! CloudWatch alarms driving the scaling policies

use crate::aws::context::AwsContext;
use crate::aws::error::{sdk_error, unsupported};
use crate::provider::{AlarmRequest, LookupFilter, ProviderError, ResourceRecord};
use archforge_common::ResourceKind;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::types::{ComparisonOperator, Dimension, StandardUnit, Statistic};
use tracing::info;

/// Metric dimension scoping an alarm to one auto-scaling group
const GROUP_DIMENSION: &str = "AutoScalingGroupName";

/// CloudWatch client
pub struct CloudWatchClient {
    client: Client,
}

impl CloudWatchClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.cloudwatch_client(),
        }
    }

    /// Create or replace an alarm; alarms are identified by name
    pub async fn put_alarm(&self, request: &AlarmRequest) -> Result<ResourceRecord, ProviderError> {
        self.client
            .put_metric_alarm()
            .alarm_name(&request.name)
            .alarm_description(&request.description)
            .namespace(&request.namespace)
            .metric_name(&request.metric_name)
            .statistic(Statistic::from(request.statistic.as_str()))
            .unit(StandardUnit::from(request.unit.as_str()))
            .comparison_operator(ComparisonOperator::from(request.comparison_operator.as_str()))
            .threshold(request.threshold)
            .evaluation_periods(request.evaluation_periods)
            .period(request.period)
            .dimensions(
                Dimension::builder()
                    .name(GROUP_DIMENSION)
                    .value(&request.auto_scaling_group_name)
                    .build(),
            )
            .actions_enabled(true)
            .alarm_actions(&request.alarm_action_arn)
            .ok_actions(&request.ok_action_arn)
            .send()
            .await
            .map_err(sdk_error("PutMetricAlarm"))?;

        info!(
            name = %request.name,
            metric = %request.metric_name,
            threshold = request.threshold,
            "Created alarm"
        );
        Ok(ResourceRecord::new(&request.name).with_field("metric_name", &request.metric_name))
    }

    pub async fn describe_alarms(&self, by: &LookupFilter) -> Result<Vec<ResourceRecord>, ProviderError> {
        let name = match by {
            LookupFilter::NativeName(name) | LookupFilter::Id(name) => name,
            _ => return Err(unsupported(ResourceKind::Alarm)),
        };
        let response = self
            .client
            .describe_alarms()
            .alarm_names(name)
            .send()
            .await
            .map_err(sdk_error("DescribeAlarms"))?;

        Ok(response
            .metric_alarms()
            .iter()
            .filter_map(|alarm| {
                let mut record = ResourceRecord::new(alarm.alarm_name()?);
                if let Some(state) = alarm.state_value() {
                    record = record.with_status(state.as_str());
                }
                if let Some(arn) = alarm.alarm_arn() {
                    record = record.with_field("arn", arn);
                }
                Some(record)
            })
            .collect())
    }

    pub async fn delete_alarm(&self, name: &str) -> Result<(), ProviderError> {
        self.client
            .delete_alarms()
            .alarm_names(name)
            .send()
            .await
            .map_err(sdk_error("DeleteAlarms"))?;
        info!(name = %name, "Deleted alarm");
        Ok(())
    }
}
