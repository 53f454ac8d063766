//! Per-language kernel scripts: an initialization script that defines
//! the introspection helpers inside the kernel, and the query command
//! that evaluates them.
//!
//! Only the Python family is supported today. The helpers enumerate
//! in-scope variables, keep the ones whose runtime type is a
//! GraphScope session or graph, and serialize the survivors (plus the
//! default session, if one is active) to a JSON array the handler can
//! parse.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Language {0} not supported yet!")]
    UnsupportedLanguage(String),
}

/// The scripts for one kernel language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageModel {
    pub init_script: &'static str,
    pub query_command: &'static str,
}

/// Kernel-side helpers for IPython kernels.
///
/// Evaluating the query command returns the JSON text as an expression
/// result (execute_result), not as printed output; content strings are
/// truncated to 500 characters with a trailing ellipsis.
const PY_INIT_SCRIPT: &str = r#"
import json
import sys

from IPython import get_ipython
from IPython.core.magics.namespace import NamespaceMagics


_gs_inspector_nms = NamespaceMagics()
_gs_inspector_shell = get_ipython()
_gs_inspector_nms.shell = _gs_inspector_shell.kernel.shell


def _gs_inspector_contentof(x):
    try:
        content = str(x)
        if len(content) > 500:
            return content[:500] + " ..."
        return content
    except Exception:
        return ""


def _gs_inspector_inspect_variable():
    if 'graphscope' not in sys.modules:
        return ""

    def _is_session(v):
        return isinstance(v, graphscope.Session)

    def _is_graph(v):
        return isinstance(v, graphscope.Graph) or isinstance(v, graphscope.nx.Graph)

    def _belongs_to_gs(_v):
        v = eval(_v)
        return _is_session(v) or _is_graph(v)

    def _parse(_v):
        v = eval(_v)
        rlt = {
            "name": _v,
            "content": str(_gs_inspector_contentof(v)),
        }
        if _is_session(v):
            rlt["type"] = "session"
            rlt["props"] = {
                "session_id": v.session_id,
                "state": v.info["status"],
            }
        elif _is_graph(v):
            rlt["type"] = "graph"
            rlt["props"] = {
                "session_id": v.session_id,
                "state": str(v.loaded()),
            }
        return rlt

    values = _gs_inspector_nms.who_ls()
    variables = [_parse(_v) for _v in values if _belongs_to_gs(_v)]

    if graphscope.has_default_session():
        _sess = graphscope.get_default_session()
        variables.append(
            {
                "name": "Default Session",
                "content": str(_gs_inspector_contentof(_sess)),
                "type": "session",
                "props": {
                    "session_id": _sess.session_id,
                    "state": _sess.info["status"],
                },
            }
        )

    return json.dumps(variables)


def _gs_inspector_delete_variable(x):
    exec("del %s" % x, globals())
"#;

const PY_MODEL: LanguageModel = LanguageModel {
    init_script: PY_INIT_SCRIPT,
    query_command: "_gs_inspector_inspect_variable()",
};

/// Look up the scripts for a kernel language.
pub fn get_script(language: &str) -> Result<LanguageModel, ScriptError> {
    match language {
        "python" | "python2" | "python3" => Ok(PY_MODEL),
        other => Err(ScriptError::UnsupportedLanguage(other.to_string())),
    }
}
