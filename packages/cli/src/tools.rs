// ABOUTME: Function-tool declarations advertised to the remote reasoning engine
// ABOUTME: Mirrors the tool server's endpoint parameters exactly

use serde_json::{json, Value};

/// Declarations the remote engine registers as callable tools. Each
/// maps one-to-one onto a tool server endpoint.
pub fn function_declarations(base_url: &str) -> Value {
    json!([
        {
            "name": "execute_code",
            "description": "Run code in the sandbox and return stdout, stderr, and exit code",
            "endpoint": format!("{base_url}/execute"),
            "parameters": {
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "Source code to run" },
                    "language": {
                        "type": "string",
                        "enum": ["python", "bash", "javascript", "typescript",
                                 "cpp", "c", "go", "rust", "ruby", "java"],
                        "description": "Language to run the code as (default python)"
                    },
                    "timeout": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": 3600,
                        "description": "Timeout in seconds"
                    }
                },
                "required": ["code"]
            }
        },
        {
            "name": "upload_file",
            "description": "Upload a local file into the sandbox working directory",
            "endpoint": format!("{base_url}/upload"),
            "parameters": {
                "type": "object",
                "properties": {
                    "local_path": { "type": "string", "description": "Path on the local machine" },
                    "sandbox_path": { "type": "string", "description": "Destination path inside the sandbox" }
                },
                "required": ["local_path"]
            }
        },
        {
            "name": "download_file",
            "description": "Download a file from the sandbox to the local machine",
            "endpoint": format!("{base_url}/download"),
            "parameters": {
                "type": "object",
                "properties": {
                    "sandbox_path": { "type": "string", "description": "Path inside the sandbox" },
                    "local_path": { "type": "string", "description": "Destination path on the local machine" }
                },
                "required": ["sandbox_path", "local_path"]
            }
        },
        {
            "name": "check_file",
            "description": "Check whether a local file exists and report its metadata",
            "endpoint": format!("{base_url}/check-file"),
            "parameters": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to check" }
                },
                "required": ["path"]
            }
        }
    ])
}
