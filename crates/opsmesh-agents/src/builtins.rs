use crate::agent::{Agent, AgentDescriptor};
use crate::registry::AgentRegistry;
use async_trait::async_trait;
use opsmesh_core::{Metadata, OpsmeshResult, TaskCall, TaskOutput};
use opsmesh_knowledge::KnowledgeBase;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const DEFAULT_REGION: &str = "us-east-1";

/// Register the infrastructure, deployment and monitoring agents.
pub fn register_builtins(registry: &mut AgentRegistry, knowledge: Arc<KnowledgeBase>) {
    registry.register(Arc::new(InfrastructureAgent::new(knowledge.clone())));
    registry.register(Arc::new(DeploymentAgent::new(knowledge.clone())));
    registry.register(Arc::new(MonitoringAgent::new(knowledge)));
}

fn short_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &raw[..12])
}

fn remember_task(knowledge: &KnowledgeBase, call: &TaskCall, outcome: &serde_json::Value) {
    knowledge.remember(
        &call.agent_type,
        json!({
            "plan_id": call.plan_id,
            "task_id": call.task_id,
            "description": call.description,
            "outcome": outcome,
        }),
    );
}

/// Simulated cloud infrastructure provisioning (instances, buckets).
pub struct InfrastructureAgent {
    descriptor: AgentDescriptor,
    knowledge: Arc<KnowledgeBase>,
}

impl InfrastructureAgent {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            descriptor: AgentDescriptor::new(
                "infrastructure",
                "Provisions cloud infrastructure: instances, buckets, networks.",
            )
            .with_keywords([
                "ec2",
                "s3",
                "vpc",
                "subnet",
                "security group",
                "load balancer",
                "create instance",
                "launch instance",
                "provision",
                "infrastructure",
            ])
            .recording_deployments(),
            knowledge,
        }
    }

    fn launch_instance(&self, call: &TaskCall) -> serde_json::Value {
        let instance_id = short_id("i");
        let instance_type = call.param_str("instance_type").unwrap_or("t2.micro");
        let region = call.param_str("region").unwrap_or(DEFAULT_REGION);

        let mut metadata = Metadata::new();
        metadata.insert("instance_type".into(), json!(instance_type));
        metadata.insert("region".into(), json!(region));
        metadata.insert("status".into(), json!("running"));
        self.knowledge
            .register_resource("ec2_instance", &instance_id, metadata);

        json!({
            "instance_id": instance_id,
            "instance_type": instance_type,
            "region": region,
            "status": "running",
        })
    }

    fn create_bucket(&self, call: &TaskCall) -> serde_json::Value {
        let bucket_name = call
            .param_str("bucket_name")
            .map(str::to_string)
            .unwrap_or_else(|| short_id("bucket"));
        let region = call.param_str("region").unwrap_or(DEFAULT_REGION);
        let acl = call.param_str("acl").unwrap_or("private");

        let mut metadata = Metadata::new();
        metadata.insert("region".into(), json!(region));
        metadata.insert("acl".into(), json!(acl));
        self.knowledge
            .register_resource("s3_bucket", &bucket_name, metadata);

        json!({
            "bucket_name": bucket_name,
            "bucket_url": format!("https://{bucket_name}.s3.amazonaws.com"),
        })
    }
}

#[async_trait]
impl Agent for InfrastructureAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &TaskCall) -> OpsmeshResult<TaskOutput> {
        info!(task_id = %call.task_id, "Infrastructure agent executing task");
        let description = call.description.to_lowercase();

        // An explicit service name wins; "instance" alone only implies ec2
        // when no bucket is mentioned.
        let payload = if description.contains("ec2") {
            self.launch_instance(call)
        } else if description.contains("s3") || description.contains("bucket") {
            self.create_bucket(call)
        } else if description.contains("instance") {
            self.launch_instance(call)
        } else {
            json!({
                "message": format!("Simulated infrastructure task: {}", call.description),
                "status": "completed",
            })
        };

        remember_task(&self.knowledge, call, &payload);
        Ok(TaskOutput::success(payload))
    }
}

/// Simulated application deployment.
pub struct DeploymentAgent {
    descriptor: AgentDescriptor,
    knowledge: Arc<KnowledgeBase>,
}

impl DeploymentAgent {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            descriptor: AgentDescriptor::new(
                "deployment",
                "Builds and releases applications to an environment.",
            )
            .with_keywords([
                "deploy",
                "release",
                "version",
                "build",
                "pipeline",
                "ci/cd",
                "continuous integration",
                "continuous deployment",
                "git",
                "docker",
            ])
            .recording_deployments(),
            knowledge,
        }
    }
}

#[async_trait]
impl Agent for DeploymentAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &TaskCall) -> OpsmeshResult<TaskOutput> {
        info!(task_id = %call.task_id, "Deployment agent executing task");
        let environment = call.param_str("environment").unwrap_or("dev");

        let payload = json!({
            "deployment_id": short_id("dep"),
            "application": call.param_str("application").unwrap_or("unknown"),
            "version": call.param_str("version").unwrap_or("1.0.0"),
            "environment": environment,
            "status": "success",
            "url": format!("https://{environment}.example.com"),
        });

        remember_task(&self.knowledge, call, &payload);
        Ok(TaskOutput::success(payload))
    }
}

/// Simulated monitoring and alerting setup.
pub struct MonitoringAgent {
    descriptor: AgentDescriptor,
    knowledge: Arc<KnowledgeBase>,
}

impl MonitoringAgent {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            descriptor: AgentDescriptor::new(
                "monitoring",
                "Configures dashboards, metrics and alerts.",
            )
            .with_keywords([
                "monitor",
                "alert",
                "metric",
                "log",
                "dashboard",
                "cloudwatch",
                "performance",
                "health",
                "status",
                "notification",
            ]),
            knowledge,
        }
    }
}

#[async_trait]
impl Agent for MonitoringAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: &TaskCall) -> OpsmeshResult<TaskOutput> {
        info!(task_id = %call.task_id, "Monitoring agent executing task");
        let alerts = call
            .parameters
            .get("alerts")
            .filter(|v| v.is_array())
            .cloned()
            .unwrap_or_else(|| json!(["CPU > 80%", "Memory > 90%"]));

        let payload = json!({
            "message": format!("Set up monitoring for: {}", call.description),
            "dashboard_url": format!("https://monitoring.example.com/dashboard/{}", short_id("db")),
            "alerts_configured": alerts,
        });

        remember_task(&self.knowledge, call, &payload);
        Ok(TaskOutput::success(payload))
    }
}
