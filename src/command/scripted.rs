use super::{CommandOutput, CommandRunner};
use std::collections::HashMap;
use std::sync::Mutex;

/// Command runner answering from a fixed table keyed by the argument list.
/// Unknown argument lists behave like a failed invocation.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<Vec<String>, String>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, args: &[&str], stdout: &str) -> Self {
        self.responses.insert(
            args.iter().map(ToString::to_string).collect(),
            stdout.to_string(),
        );
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, args: &[String]) -> Option<CommandOutput> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.responses.get(args).map(|stdout| CommandOutput {
            stdout: stdout.clone(),
            stderr: String::new(),
        })
    }
}
