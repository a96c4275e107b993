//! The built-in tool set.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use super::char_count::{CountCharactersArgs, count_characters};
use super::schema::parameters_for;
use super::web_search::{self, WebSearchArgs};
use super::{COUNT_CHARACTERS, ToolError, ToolExecutor, WEB_SEARCH};
use crate::config::ConfigHandle;
use crate::model::{ToolCall, ToolDeclaration};
use crate::quota::SearchQuotaGate;
use crate::search::SearchBackend;
use crate::store::CounterStore;

/// `count_characters` and `web_search`
pub struct BuiltinTools<S, C> {
    search: Arc<S>,
    gate: SearchQuotaGate<C>,
    config: ConfigHandle,
}

impl<S, C> Clone for BuiltinTools<S, C> {
    fn clone(&self) -> Self {
        Self {
            search: Arc::clone(&self.search),
            gate: self.gate.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: SearchBackend, C: CounterStore> BuiltinTools<S, C> {
    pub fn new(search: Arc<S>, gate: SearchQuotaGate<C>, config: ConfigHandle) -> Self {
        Self {
            search,
            gate,
            config,
        }
    }
}

fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T, ToolError> {
    let arguments = match &call.arguments {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
        tool: call.name.clone(),
        message: e.to_string(),
    })
}

impl<S: SearchBackend, C: CounterStore> ToolExecutor for BuiltinTools<S, C> {
    fn declarations(&self, search_available: bool) -> Vec<ToolDeclaration> {
        let limit = self.config.current().message_limit;
        let mut declarations = vec![ToolDeclaration {
            name: COUNT_CHARACTERS.to_string(),
            description: format!(
                "Count the characters in a draft answer and check it against the {} character message limit.",
                limit
            ),
            parameters: parameters_for::<CountCharactersArgs>(),
        }];
        if search_available {
            declarations.push(ToolDeclaration {
                name: WEB_SEARCH.to_string(),
                description: "Search the web for current information. Use only when the answer depends on recent or external facts.".to_string(),
                parameters: parameters_for::<WebSearchArgs>(),
            });
        }
        declarations
    }

    #[instrument(skip(self, call), fields(tool = %call.name))]
    async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        debug!("executing tool");
        match call.name.as_str() {
            COUNT_CHARACTERS => {
                let args: CountCharactersArgs = parse_args(call)?;
                let count = count_characters(&args.text, self.config.current().message_limit);
                serde_json::to_value(count).map_err(|e| ToolError::Backend(e.into()))
            }
            WEB_SEARCH => {
                let args: WebSearchArgs = parse_args(call)?;
                web_search::run(self.search.as_ref(), &self.gate, &self.config, args).await
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}
