//! Tool catalog exposed over MCP.
//!
//! Every host tool is named `roblox_<job type>` and forwards its arguments
//! to the plugin unchanged, apart from the `code` alias handled in
//! [`prepare_args`]. The connection status tool is answered by the bridge
//! itself and never reaches the host.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

pub const CONNECTION_STATUS_TOOL: &str = "studio_get_connection_status";
const HOST_TOOL_PREFIX: &str = "roblox_";

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    /// `None` for tools the bridge answers locally.
    #[serde(skip)]
    pub job_type: Option<&'static str>,
}

pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolCatalog {
    pub fn builtin() -> Self {
        let tools = builtin_tools();
        let index = tools
            .iter()
            .enumerate()
            .map(|(position, tool)| (tool.name.clone(), position))
            .collect();
        Self { tools, index }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&position| &self.tools[position])
    }

    /// Job type a tool call is forwarded as.
    pub fn job_type(&self, name: &str) -> Option<&'static str> {
        self.get(name).and_then(|tool| tool.job_type)
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Shapes tool arguments into job arguments. Code-running jobs read `code`;
/// callers that pass `script` or `source` instead are accepted.
pub fn prepare_args(job_type: &str, mut args: Map<String, Value>) -> Map<String, Value> {
    if matches!(job_type, "run_code" | "run_script_in_play_mode") && !is_present(args.get("code"))
    {
        let fallback = ["script", "source"]
            .iter()
            .find_map(|key| args.get(*key).filter(|value| is_present(Some(*value))).cloned());
        args.insert("code".to_string(), fallback.unwrap_or(Value::Null));
    }
    args
}

fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

struct Schema {
    properties: Map<String, Value>,
    required: Vec<&'static str>,
}

impl Schema {
    fn client() -> Self {
        let mut properties = Map::new();
        properties.insert("client_id".into(), string());
        Self {
            properties,
            required: Vec::new(),
        }
    }

    /// Target instance by dotted path, path segments or debug id.
    fn instance() -> Self {
        Self::client()
            .prop(
                "path",
                described("string", "Dot-separated path, e.g. 'Workspace.Baseplate'."),
            )
            .prop(
                "pathArray",
                json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Path as a list of names, e.g. ['Workspace','Baseplate'].",
                }),
            )
            .prop(
                "id",
                described("string", "Debug id returned by an earlier call."),
            )
    }

    fn region() -> Self {
        Self::client()
            .prop(
                "regionMin",
                described("object", "Minimum corner, e.g. {\"x\":0,\"y\":0,\"z\":0}."),
            )
            .prop(
                "regionMax",
                described("object", "Maximum corner, e.g. {\"x\":100,\"y\":50,\"z\":100}."),
            )
            .prop(
                "resolution",
                described("integer", "Voxel resolution in studs (multiple of 4, default 4)."),
            )
    }

    fn prop(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    fn required(mut self, names: &[&'static str]) -> Self {
        self.required.extend_from_slice(names);
        self
    }

    fn build(self) -> Value {
        let mut schema = json!({ "type": "object", "properties": self.properties });
        if !self.required.is_empty() {
            schema["required"] = json!(self.required);
        }
        schema
    }
}

fn string() -> Value {
    json!({ "type": "string" })
}

fn typed(kind: &str) -> Value {
    json!({ "type": kind })
}

fn described(kind: &str, description: &str) -> Value {
    json!({ "type": kind, "description": description })
}

fn string_list() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn rich_properties(description: &str) -> Value {
    described(
        "object",
        &format!("{description} Use _type objects for rich types."),
    )
}

fn host_tool(job_type: &'static str, description: &str, schema: Schema) -> ToolDefinition {
    ToolDefinition {
        name: format!("{HOST_TOOL_PREFIX}{job_type}"),
        description: description.to_string(),
        input_schema: schema.build(),
        job_type: Some(job_type),
    }
}

fn builtin_tools() -> Vec<ToolDefinition> {
    let mut tools = vec![ToolDefinition {
        name: CONNECTION_STATUS_TOOL.to_string(),
        description: "Check whether the Roblox Studio plugin is polling the bridge.".to_string(),
        input_schema: Schema::client().build(),
        job_type: None,
    }];
    tools.extend(instance_tools());
    tools.extend(property_tools());
    tools.extend(script_tools());
    tools.extend(editor_tools());
    tools.extend(play_tools());
    tools.extend(terrain_tools());
    tools.extend(bulk_tools());
    tools.extend(data_model_tools());
    tools
}

fn instance_tools() -> Vec<ToolDefinition> {
    vec![
        host_tool(
            "list_services",
            "List the top-level services of the open place.",
            Schema::client(),
        ),
        host_tool(
            "get_children",
            "Get the direct children of an instance.",
            Schema::instance(),
        ),
        host_tool(
            "get_descendants",
            "Get every descendant of an instance. Output can be large; get_tree gives an overview.",
            Schema::instance(),
        ),
        host_tool(
            "get_instance",
            "Get name, className and full name of one instance.",
            Schema::instance(),
        ),
        host_tool(
            "find_instances",
            "Find instances under an ancestor by name, className and/or tag.",
            Schema::client()
                .prop("name", described("string", "Exact Name match."))
                .prop("className", described("string", "Exact ClassName match."))
                .prop("tag", described("string", "Required CollectionService tag."))
                .prop("ancestorPath", string())
                .prop("ancestorPathArray", string_list()),
        ),
        host_tool(
            "get_tree",
            "Get a compact recursive tree of an instance hierarchy with names, classes and \
             script line counts. maxDepth defaults to 5 and maxChildren to 50 per node.",
            Schema::instance()
                .prop("maxDepth", described("integer", "Maximum depth (default 5)."))
                .prop(
                    "maxChildren",
                    described("integer", "Maximum children per node (default 50)."),
                ),
        ),
        host_tool(
            "create_instance",
            "Create an instance. Name, Source and other properties go in the properties map.",
            Schema::client()
                .prop("className", string())
                .prop("parentPath", string())
                .prop("parentPathArray", string_list())
                .prop("properties", rich_properties("Properties to set."))
                .required(&["className"]),
        ),
        host_tool(
            "delete_instance",
            "Destroy an instance and its descendants. Undoable.",
            Schema::instance(),
        ),
        host_tool(
            "clone_instance",
            "Clone an instance with its descendants, optionally under a new parent and name. Undoable.",
            Schema::instance()
                .prop("newParentPath", string())
                .prop("newParentPathArray", string_list())
                .prop("newName", described("string", "Name for the clone.")),
        ),
        host_tool(
            "reparent_instance",
            "Move an instance under a new parent. Undoable.",
            Schema::instance()
                .prop("newParentPath", string())
                .prop("newParentPathArray", string_list())
                .required(&["newParentPath"]),
        ),
        host_tool(
            "set_name",
            "Rename an instance. Undoable.",
            Schema::instance().prop("name", string()).required(&["name"]),
        ),
        host_tool(
            "select_instance",
            "Select an instance in the Explorer.",
            Schema::instance(),
        ),
        host_tool(
            "get_selection",
            "Get the instances currently selected in the Explorer.",
            Schema::client(),
        ),
    ]
}

fn property_tools() -> Vec<ToolDefinition> {
    vec![
        host_tool(
            "get_properties",
            "Read named properties of an instance. Complex values come back as _type objects \
             (Color3, Vector3, CFrame, UDim2, BrickColor, EnumItem and so on).",
            Schema::instance()
                .prop(
                    "properties",
                    json!({
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Property names to read.",
                    }),
                )
                .required(&["properties"]),
        ),
        host_tool(
            "set_properties",
            "Set properties on an instance. Undoable. Complex values use _type objects such as \
             {\"_type\":\"Color3\",\"r\":255,\"g\":0,\"b\":0} or {\"_type\":\"Vector3\",\"x\":1,\"y\":2,\"z\":3}.",
            Schema::instance()
                .prop("properties", rich_properties("Properties to set."))
                .required(&["properties"]),
        ),
        host_tool(
            "get_all_properties",
            "Read every readable, non-deprecated property of an instance through reflection.",
            Schema::instance(),
        ),
        host_tool(
            "get_attributes",
            "Get the custom attributes of an instance. Complex values come back as _type objects.",
            Schema::instance(),
        ),
        host_tool(
            "set_attributes",
            "Set custom attributes on an instance. Undoable. Accepts _type objects.",
            Schema::instance()
                .prop("attributes", typed("object"))
                .required(&["attributes"]),
        ),
        host_tool(
            "get_tags",
            "Get the CollectionService tags of an instance.",
            Schema::instance(),
        ),
        host_tool(
            "add_tag",
            "Add a CollectionService tag to an instance. Undoable.",
            Schema::instance().prop("tag", string()).required(&["tag"]),
        ),
        host_tool(
            "remove_tag",
            "Remove a CollectionService tag from an instance. Undoable.",
            Schema::instance().prop("tag", string()).required(&["tag"]),
        ),
    ]
}

fn script_tools() -> Vec<ToolDefinition> {
    let patch = json!({
        "type": "object",
        "properties": {
            "op": {
                "type": "string",
                "enum": ["insert", "replace", "delete", "append", "prepend"],
            },
            "lineStart": { "type": "integer" },
            "lineEnd": { "type": "integer" },
            "content": { "type": "string" },
            "expectedContent": { "type": "string" },
            "expectedContext": { "type": "string" },
        },
        "required": ["op"],
    });
    vec![
        host_tool(
            "read_script",
            "Read the full Source of a Script, LocalScript or ModuleScript. For large scripts \
             read a range with get_script_lines.",
            Schema::instance(),
        ),
        host_tool(
            "write_script",
            "Replace the full Source of a script. Undoable. Use patch_script for partial edits.",
            Schema::instance().prop("source", string()).required(&["source"]),
        ),
        host_tool(
            "patch_script",
            "Apply line-based patches (insert, replace, delete, append, prepend) to a script. \
             Undoable. Every replace and delete must carry expectedContent and every insert \
             expectedContext; the whole batch is rejected if any guard does not match or the \
             result is not structurally valid.",
            Schema::instance()
                .prop("patches", json!({ "type": "array", "items": patch }))
                .required(&["patches"]),
        ),
        host_tool(
            "get_script_lines",
            "Read a line range of a script. Without startLine and endLine only the line count is returned.",
            Schema::instance()
                .prop("startLine", typed("integer"))
                .prop("endLine", typed("integer")),
        ),
        host_tool(
            "search_script",
            "Search a script's source for a plain string or Lua pattern.",
            Schema::instance()
                .prop("query", string())
                .prop("usePattern", typed("boolean"))
                .prop("caseSensitive", typed("boolean"))
                .prop("contextLines", typed("integer"))
                .prop("maxResults", typed("integer"))
                .required(&["query"]),
        ),
        host_tool(
            "get_script_functions",
            "List the function definitions of a script with their lines and kinds.",
            Schema::instance(),
        ),
        host_tool(
            "search_across_scripts",
            "Search every script under an ancestor for a query.",
            Schema::client()
                .prop("query", string())
                .prop("ancestorPath", string())
                .prop("ancestorPathArray", string_list())
                .prop("usePattern", typed("boolean"))
                .prop("caseSensitive", typed("boolean"))
                .prop("maxScripts", typed("integer"))
                .prop("maxMatchesPerScript", typed("integer"))
                .required(&["query"]),
        ),
    ]
}

fn editor_tools() -> Vec<ToolDefinition> {
    vec![
        host_tool(
            "open_script",
            "Open a script in the script editor, optionally at a line.",
            Schema::instance().prop("line", typed("integer")),
        ),
        host_tool(
            "get_open_scripts",
            "List the scripts open in the script editor.",
            Schema::client(),
        ),
        host_tool(
            "close_script",
            "Close a script's editor tab.",
            Schema::instance(),
        ),
        host_tool("undo", "Undo the last change (Ctrl+Z).", Schema::client()),
        host_tool("redo", "Redo the last undone change (Ctrl+Y).", Schema::client()),
        host_tool(
            "set_waypoint",
            "Record a named undo/redo waypoint.",
            Schema::client().prop("name", string()),
        ),
    ]
}

fn play_tools() -> Vec<ToolDefinition> {
    vec![
        host_tool(
            "run_code",
            "Run Lua code inside Studio and return its serialized result.",
            Schema::client().prop("code", string()).required(&["code"]),
        ),
        host_tool(
            "insert_model",
            "Insert a Marketplace asset into Workspace.",
            Schema::client().prop("assetId", string()).required(&["assetId"]),
        ),
        host_tool(
            "get_console_output",
            "Read the Output log buffered by the plugin.",
            Schema::client()
                .prop("since", typed("number"))
                .prop("maxEntries", typed("integer")),
        ),
        host_tool(
            "start_stop_play",
            "Switch Studio between Edit, Play, Run and Test modes.",
            Schema::client()
                .prop("mode", string())
                .prop("action", string())
                .required(&["mode"]),
        ),
        host_tool(
            "get_studio_mode",
            "Report the current run mode and whether play mode is active.",
            Schema::client(),
        ),
        host_tool(
            "run_script_in_play_mode",
            "Run a Lua snippet while Studio is in Play or Run mode.",
            Schema::client().prop("code", string()).required(&["code"]),
        ),
    ]
}

fn terrain_tools() -> Vec<ToolDefinition> {
    let material = described("string", "Terrain material name, e.g. Grass, Rock, Water, Sand.");
    vec![
        host_tool(
            "terrain_fill_block",
            "Fill a box with a terrain material. Undoable. cframe is the centre (position and \
             optional rotation), size the extent in studs.",
            Schema::client()
                .prop(
                    "cframe",
                    described(
                        "object",
                        "Position {\"x\":0,\"y\":0,\"z\":0} or a full CFrame {\"components\":[...]}.",
                    ),
                )
                .prop("size", described("object", "{\"x\":10,\"y\":5,\"z\":10} in studs."))
                .prop("material", material.clone())
                .required(&["cframe", "size", "material"]),
        ),
        host_tool(
            "terrain_fill_ball",
            "Fill a sphere with a terrain material. Undoable.",
            Schema::client()
                .prop("center", described("object", "{\"x\":0,\"y\":0,\"z\":0}"))
                .prop("radius", described("number", "Radius in studs."))
                .prop("material", material.clone())
                .required(&["center", "radius", "material"]),
        ),
        host_tool(
            "terrain_fill_cylinder",
            "Fill a cylinder aligned with the CFrame's Y axis. Undoable.",
            Schema::client()
                .prop("cframe", described("object", "Centre of the cylinder."))
                .prop("height", described("number", "Height in studs."))
                .prop("radius", described("number", "Radius in studs."))
                .prop("material", material)
                .required(&["cframe", "height", "radius", "material"]),
        ),
        host_tool(
            "terrain_replace_material",
            "Replace one terrain material with another inside a region. Undoable.",
            Schema::region()
                .prop("from", described("string", "Material to replace, e.g. Sand."))
                .prop("to", described("string", "Replacement material, e.g. Ground."))
                .required(&["regionMin", "regionMax", "from", "to"]),
        ),
        host_tool(
            "terrain_read_voxels",
            "Read voxel materials and occupancy in a region. Regions above 4096 voxels return a \
             material histogram instead; raise resolution to sample large areas.",
            Schema::region().required(&["regionMin", "regionMax"]),
        ),
        host_tool(
            "terrain_clear_region",
            "Fill a region with Air. Undoable.",
            Schema::client()
                .prop("regionMin", typed("object"))
                .prop("regionMax", typed("object"))
                .required(&["regionMin", "regionMax"]),
        ),
    ]
}

fn bulk_tools() -> Vec<ToolDefinition> {
    let instance_ref = json!({
        "path": { "type": "string" },
        "pathArray": { "type": "array", "items": { "type": "string" } },
        "id": { "type": "string" },
    });
    let mut operation = instance_ref.clone();
    operation["properties"] = typed("object");
    vec![
        host_tool(
            "bulk_create_instances",
            "Create up to 200 instances in one round trip under a single undo waypoint.",
            Schema::client()
                .prop(
                    "instances",
                    json!({
                        "type": "array",
                        "maxItems": 200,
                        "items": {
                            "type": "object",
                            "properties": {
                                "className": { "type": "string" },
                                "parentPath": { "type": "string" },
                                "parentPathArray": { "type": "array", "items": { "type": "string" } },
                                "properties": { "type": "object" },
                            },
                            "required": ["className"],
                        },
                    }),
                )
                .required(&["instances"]),
        ),
        host_tool(
            "bulk_set_properties",
            "Set properties on up to 200 instances in one round trip under a single undo waypoint.",
            Schema::client()
                .prop(
                    "operations",
                    json!({
                        "type": "array",
                        "maxItems": 200,
                        "items": {
                            "type": "object",
                            "properties": operation,
                            "required": ["properties"],
                        },
                    }),
                )
                .required(&["operations"]),
        ),
        host_tool(
            "bulk_delete_instances",
            "Destroy several instances in one round trip under a single undo waypoint.",
            Schema::client()
                .prop(
                    "instances",
                    json!({
                        "type": "array",
                        "items": { "type": "object", "properties": instance_ref },
                    }),
                )
                .required(&["instances"]),
        ),
        host_tool(
            "find_and_replace_in_scripts",
            "Replace a plain string in every script under an ancestor under a single undo \
             waypoint. dryRun previews matches; caseSensitive defaults to true; maxScripts \
             defaults to 50 (at most 200).",
            Schema::client()
                .prop("find", described("string", "Plain string to find."))
                .prop("replace", described("string", "Replacement string."))
                .prop("ancestorPath", string())
                .prop("ancestorPathArray", string_list())
                .prop("caseSensitive", typed("boolean"))
                .prop(
                    "maxScripts",
                    described("integer", "Maximum scripts to modify (default 50)."),
                )
                .prop("dryRun", described("boolean", "Preview without modifying."))
                .required(&["find", "replace"]),
        ),
    ]
}

fn data_model_tools() -> Vec<ToolDefinition> {
    vec![
        host_tool(
            "get_place_info",
            "Describe the open place: ids, name, version, gravity, streaming, Lighting \
             properties and child counts of the major services.",
            Schema::client(),
        ),
        host_tool(
            "set_lighting",
            "Set Lighting properties such as TimeOfDay, Brightness, FogEnd or Technology. Undoable.",
            Schema::client()
                .prop("properties", rich_properties("Lighting properties to set."))
                .required(&["properties"]),
        ),
        host_tool(
            "get_workspace_info",
            "Report Workspace settings: gravity, streaming, wind and the current camera CFrame.",
            Schema::client(),
        ),
        host_tool(
            "get_team_list",
            "List the teams with their BrickColor and AutoAssignable flag.",
            Schema::client(),
        ),
        host_tool(
            "get_lighting_effects",
            "List post-processing effects under Lighting with their key properties.",
            Schema::client(),
        ),
    ]
}
