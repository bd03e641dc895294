use serde_json::json;

use super::*;

#[test]
fn success_envelope_shape() {
	let result = ResultBuilder::new("launch").data(json!({ "args": [] })).build();
	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["ok"], true);
	assert_eq!(value["command"], "launch");
	assert_eq!(value["schemaVersion"], SCHEMA_VERSION);
	assert!(value["timings"]["durationMs"].is_u64());
	assert!(value.get("error").is_none());
}

#[test]
fn error_envelope_has_no_data() {
	let result: CommandResult<()> = ResultBuilder::new("task")
		.error("UNKNOWN_TASK", "no handler registered for task 'seed'")
		.build();
	let value = serde_json::to_value(&result).unwrap();
	assert_eq!(value["ok"], false);
	assert_eq!(value["error"]["code"], "UNKNOWN_TASK");
	assert!(value.get("data").is_none());
}

#[test]
fn builder_without_data_is_not_ok() {
	let result: CommandResult<serde_json::Value> = ResultBuilder::new("config").build();
	assert!(!result.ok);
}
