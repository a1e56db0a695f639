#![allow(dead_code)]

use std::path::Path;

use taskforge::engine::SchedulerConfig;
use taskforge::types::{AgentPermissions, AgentProfile, ProjectRef, SubmitRequest};

/// Builder for `AgentProfile` to simplify test setup.
pub struct AgentProfileBuilder {
    agent: AgentProfile,
}

impl AgentProfileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            agent: AgentProfile {
                id: name.to_lowercase().replace(' ', "-"),
                name: name.to_string(),
                role: "Test agent".to_string(),
                permissions: AgentPermissions::default(),
            },
        }
    }

    pub fn role(mut self, role: &str) -> Self {
        self.agent.role = role.to_string();
        self
    }

    pub fn permissions(mut self, read: bool, write: bool, delete: bool) -> Self {
        self.agent.permissions = AgentPermissions {
            read,
            write,
            delete,
        };
        self
    }

    pub fn build(self) -> AgentProfile {
        self.agent
    }
}

/// Builder for `SubmitRequest` against a (usually temporary) project dir.
pub struct SubmitRequestBuilder {
    request: SubmitRequest,
}

impl SubmitRequestBuilder {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            request: SubmitRequest {
                project: ProjectRef::from_dir(project_dir),
                agent: AgentProfileBuilder::new("Test Agent").build(),
                user_prompt: "do something useful".to_string(),
            },
        }
    }

    pub fn prompt(mut self, prompt: &str) -> Self {
        self.request.user_prompt = prompt.to_string();
        self
    }

    pub fn agent(mut self, agent: AgentProfile) -> Self {
        self.request.agent = agent;
        self
    }

    pub fn build(self) -> SubmitRequest {
        self.request
    }
}

/// Scheduler config pointing at a backend that must never be spawned for
/// real in tests that use a fake.
pub fn test_scheduler_config(max_concurrent: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrent,
        backend_program: "fake-backend".to_string(),
        backend_args: vec!["--print".to_string()],
    }
}
