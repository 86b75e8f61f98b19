//! The tool trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conch_types::CmdError;

use crate::context::Ctx;

/// A command runnable inside the shell. Tools receive their own context
/// (argv set, endpoints installed) and report a status; the scheduler
/// turns that status into channel closes.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name commands are looked up by.
    fn name(&self) -> &'static str;

    /// One-line operand description for usage messages.
    fn usage(&self) -> &'static str;

    async fn run(&self, ctx: Ctx) -> Result<(), CmdError>;
}

/// Name → tool table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        v.sort();
        v
    }
}
