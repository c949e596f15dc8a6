//! Activated job model

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use jobflow_protocol::{epoch_millis_to_datetime, parse_document, proto, ConversionError};
use serde::de::DeserializeOwned;

use crate::error::Result;

/// A job activated from the gateway for exclusive handling by one worker
///
/// Jobs are immutable once built from the wire response. The key is assigned
/// by the broker and is unique across the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    key: i64,
    job_type: String,
    process_instance_key: i64,
    bpmn_process_id: String,
    process_definition_version: i32,
    process_definition_key: i64,
    element_id: String,
    element_instance_key: i64,
    custom_headers: HashMap<String, String>,
    worker: String,
    retries: i32,
    deadline: DateTime<Utc>,
    variables: serde_json::Value,
    tenant_id: String,
}

impl Job {
    /// Unique key of the job
    pub fn key(&self) -> i64 {
        self.key
    }

    /// The job type the job was activated for
    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn process_instance_key(&self) -> i64 {
        self.process_instance_key
    }

    pub fn bpmn_process_id(&self) -> &str {
        &self.bpmn_process_id
    }

    pub fn process_definition_version(&self) -> i32 {
        self.process_definition_version
    }

    pub fn process_definition_key(&self) -> i64 {
        self.process_definition_key
    }

    pub fn element_id(&self) -> &str {
        &self.element_id
    }

    pub fn element_instance_key(&self) -> i64 {
        self.element_instance_key
    }

    /// Custom headers defined on the task during modelling
    pub fn custom_headers(&self) -> &HashMap<String, String> {
        &self.custom_headers
    }

    /// Name of the worker that activated the job
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Remaining retries
    pub fn retries(&self) -> i32 {
        self.retries
    }

    /// When the exclusive assignment to this worker expires
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Variables visible to the job, always a JSON object
    pub fn variables(&self) -> &serde_json::Value {
        &self.variables
    }

    /// Deserialize the variables into an application type
    pub fn variables_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.variables.clone())?)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}

impl TryFrom<proto::ActivatedJob> for Job {
    type Error = ConversionError;

    fn try_from(job: proto::ActivatedJob) -> Result<Self, Self::Error> {
        let variables = parse_document("variables", &job.variables)?;
        let custom_headers = parse_document("customHeaders", &job.custom_headers)?
            .into_iter()
            .map(|(name, value)| match value {
                serde_json::Value::String(s) => (name, s),
                other => (name, other.to_string()),
            })
            .collect();

        Ok(Self {
            key: job.key,
            job_type: job.r#type,
            process_instance_key: job.process_instance_key,
            bpmn_process_id: job.bpmn_process_id,
            process_definition_version: job.process_definition_version,
            process_definition_key: job.process_definition_key,
            element_id: job.element_id,
            element_instance_key: job.element_instance_key,
            custom_headers,
            worker: job.worker,
            retries: job.retries,
            deadline: epoch_millis_to_datetime(job.deadline)?,
            variables: serde_json::Value::Object(variables),
            tenant_id: job.tenant_id,
        })
    }
}
