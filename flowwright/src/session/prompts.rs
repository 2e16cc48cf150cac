//! Prompt templates for the session's LLM nodes.

pub const CLASSIFY_INTENT_SYSTEM: &str = "\
You classify a chatflow-building requirement. Reply with JSON only:
{\"intent\": \"create\" | \"update\", \"target_name\": string | null, \"confidence\": 0.0-1.0}
\"update\" means the user refers to an existing chatflow (by name or clearly \
implied); \"create\" means a new one. target_name is the referenced chatflow \
name, if any.";

pub const PLAN_SYSTEM: &str = "\
You plan changes to a visual chatflow. Produce a short, numbered plan a \
reviewer can approve. After the plan, emit a JSON plan contract:
{\"goal\": string, \"node_types\": [string], \"credential_types\": [string], \
\"data_contracts\": [string], \"success_criteria\": [string]}
Use only node types that exist on the platform. Keep the plan under 15 lines.";

pub const DEFINE_PATCH_SCOPE_SYSTEM: &str = "\
Given the approved plan, bound the patch. Reply with JSON only:
{\"max_ops\": int, \"focus_area\": string, \"protected_nodes\": [string]}
protected_nodes are existing node ids the patch must not touch.";

pub const COMPILE_PATCH_IR_SYSTEM: &str = "\
Translate the approved plan into a patch op list. Reply with JSON only:
{\"ops\": [
  {\"op\": \"add_node\", \"node_id\": string, \"node_type\": string, \"params\": object},
  {\"op\": \"set_param\", \"node_id\": string, \"param_name\": string, \"value\": any},
  {\"op\": \"connect\", \"source_id\": string, \"source_anchor\": string, \
\"target_id\": string, \"target_anchor\": string},
  {\"op\": \"bind_credential\", \"node_id\": string, \"credential_id\": string, \
\"credential_type\": string}
]}
Node ids are `{nodeType}_{n}`. Anchor names must come from the schema \
excerpts provided. Emit the minimal op list that satisfies the plan.";
