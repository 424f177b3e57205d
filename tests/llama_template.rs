use promptjinja::{
    render, tools_to_value, ChatMessage, Context, Engine, ParameterSchema, PropertySchema,
    RenderOptions, SchemaType, TemplateError, ToolDescriptor, Value,
};
use regex::Regex;

const LLAMA_3_2_TOOLS: &str = r##"{{- bos_token }}
{%- if custom_tools is defined %}
    {%- set tools = custom_tools %}
{%- endif %}
{%- if not tools_in_user_message is defined %}
    {%- set tools_in_user_message = true %}
{%- endif %}
{%- if not date_string is defined %}
    {%- if strftime_now is defined %}
        {%- set date_string = strftime_now("%d %b %Y") %}
    {%- else %}
        {%- set date_string = "26 Jul 2024" %}
    {%- endif %}
{%- endif %}
{%- if not tools is defined %}
    {%- set tools = none %}
{%- endif %}

{#- This block extracts the system message, so we can slot it into the right place. #}
{%- if messages[0]['role'] == 'system' %}
    {%- set system_message = messages[0]['content']|trim %}
    {%- set messages = messages[1:] %}
{%- else %}
    {%- set system_message = "" %}
{%- endif %}

{#- System message #}
{{- "<|start_header_id|>system<|end_header_id|>\n\n" }}
{%- if tools is not none %}
    {{- "Environment: ipython\n" }}
{%- endif %}
{{- "Cutting Knowledge Date: December 2023\n" }}
{{- "Today Date: " + date_string + "\n\n" }}
{%- if tools is not none and not tools_in_user_message %}
    {{- "You have access to the following functions. To call a function, please respond with JSON for a function call." }}
    {{- 'Respond in the format {"name": function name, "parameters": dictionary of argument name and its value}.' }}
    {{- "Do not use variables.\n\n" }}
    {%- for t in tools %}
        {{- t | tojson(indent=4) }}
        {{- "\n\n" }}
    {%- endfor %}
{%- endif %}
{{- system_message }}
{{- "<|eot_id|>" }}

{#- Custom tools are passed in a user message with some extra guidance #}
{%- if tools_in_user_message and not tools is none %}
    {#- Extract the first user message so we can plug it in here #}
    {%- if messages | length != 0 %}
        {%- set first_user_message = messages[0]['content']|trim %}
        {%- set messages = messages[1:] %}
    {%- else %}
        {{- raise_exception("Cannot put tools in the first user message when there's no first user message!") }}
{%- endif %}
    {{- '<|start_header_id|>user<|end_header_id|>\n\n' -}}
    {{- "Given the following functions, please respond with a JSON for a function call " }}
    {{- "with its proper arguments that best answers the given prompt.\n\n" }}
    {{- 'Respond in the format {"name": function name, "parameters": dictionary of argument name and its value}.' }}
    {{- "Do not use variables.\n\n" }}
    {%- for t in tools %}
        {{- t | tojson(indent=4) }}
        {{- "\n\n" }}
    {%- endfor %}
    {{- first_user_message + "<|eot_id|>"}}
{%- endif %}

{%- for message in messages %}
    {%- if not (message.role == 'ipython' or message.role == 'tool' or 'tool_calls' in message) %}
        {{- '<|start_header_id|>' + message['role'] + '<|end_header_id|>\n\n'+ message['content'] | trim + '<|eot_id|>' }}
    {%- elif 'tool_calls' in message %}
        {%- if not message.tool_calls|length == 1 %}
            {{- raise_exception("This model only supports single tool-calls at once!") }}
        {%- endif %}
        {%- set tool_call = message.tool_calls[0].function %}
        {{- '<|start_header_id|>assistant<|end_header_id|>\n\n' -}}
        {{- '{"name": "' + tool_call.name + '", ' }}
        {{- '"parameters": ' }}
        {{- tool_call.arguments | tojson }}
        {{- "}" }}
        {{- "<|eot_id|>" }}
    {%- elif message.role == "tool" or message.role == "ipython" %}
        {{- "<|start_header_id|>ipython<|end_header_id|>\n\n" }}
        {%- if message.content is mapping or message.content is iterable %}
            {{- message.content | tojson }}
        {%- else %}
            {{- message.content }}
        {%- endif %}
        {{- "<|eot_id|>" }}
    {%- endif %}
{%- endfor %}
{%- if add_generation_prompt %}
    {{- '<|start_header_id|>assistant<|end_header_id|>\n\n' }}
{%- endif %}"##;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn weather_tools() -> Value {
    tools_to_value(&[ToolDescriptor::new(
        "get_weather",
        "Get the current weather for a city",
    )
    .with_parameters(ParameterSchema::default().property(
        "city",
        PropertySchema::new(SchemaType::String, "Name of the city"),
        true,
    ))])
}

fn base_context(messages: Vec<ChatMessage>) -> Context {
    let mut ctx = Context::new();
    ctx.set_var("bos_token", "<|begin_of_text|>");
    ctx.set_flag("add_generation_prompt", true);
    ctx.set_messages(&messages);
    ctx
}

const TRIMMED_LAYOUT: &str = "<s>\n{%- if flag %}\n    {{- 'A' }}\n{%- endif %}\n{%- for x in items %}\n  {{- x }}\n{%- endfor %}\n  {{- name -}}  \n{# note #}\nend";

#[test]
fn trimmed_layout_renders_exactly() {
    init_tracing();
    let mut ctx = Context::new();
    ctx.set_flag("flag", true);
    ctx.set_var("items", vec![1, 2]);
    ctx.set_var("name", "Bob");

    assert_eq!(
        render(TRIMMED_LAYOUT, &ctx).unwrap(),
        "<s>\n\nA\n\n\n1\n\n\n\n2\n\nBob\n\nend"
    );

    let concat = Engine::with_options(RenderOptions {
        loop_separator: String::new(),
        ..RenderOptions::default()
    });
    assert_eq!(
        concat.render(TRIMMED_LAYOUT, &ctx).unwrap(),
        "<s>\n\nA\n\n\n1\n\n2\n\nBob\n\nend"
    );

    ctx.set_flag("flag", false);
    assert_eq!(
        render(TRIMMED_LAYOUT, &ctx).unwrap(),
        "<s>\n\n\n1\n\n\n\n2\n\nBob\n\nend"
    );
}

#[test]
fn system_prompt_with_tools_inline() {
    init_tracing();
    let mut ctx = base_context(vec![
        ChatMessage::new("system", "  You are a helpful AI assistant.\n"),
        ChatMessage::new("user", "What's the weather like today?"),
    ]);
    ctx.insert("custom_tools", weather_tools());
    ctx.set_flag("tools_in_user_message", false);

    let rendered = render(LLAMA_3_2_TOOLS, &ctx).unwrap();

    assert!(rendered.starts_with("<|begin_of_text|>"), "{rendered}");
    assert!(rendered.contains("<|start_header_id|>system<|end_header_id|>\n\n"));
    assert!(rendered.contains("Environment: ipython\n"));
    assert!(rendered.contains("Cutting Knowledge Date: December 2023\n"));
    let date = Regex::new(r"Today Date: \d{2} [A-Z][a-z]{2} \d{4}\n\n").unwrap();
    assert!(date.is_match(&rendered), "{rendered}");

    assert!(rendered.contains("You have access to the following functions."));
    assert!(rendered.contains(
        r#"Respond in the format {"name": function name, "parameters": dictionary of argument name and its value}."#
    ));
    assert!(rendered.contains("{\n    \"name\": \"get_weather\",\n    \"description\": \"Get the current weather for a city\",\n    \"parameters\": {\n        \"type\": \"object\",\n        \"required\": [\n            \"city\"\n        ],"));

    // Trim markers never eat newlines, so the template's own line break survives.
    assert!(rendered.contains("You are a helpful AI assistant.\n<|eot_id|>"));
    assert!(rendered.contains(
        "<|start_header_id|>user<|end_header_id|>\n\nWhat's the weather like today?<|eot_id|>"
    ));
    assert!(!rendered.contains("Given the following functions"));
    assert!(rendered
        .trim_end()
        .ends_with("<|start_header_id|>assistant<|end_header_id|>"));
    assert_eq!(rendered.matches("<|start_header_id|>system").count(), 1);
}

#[test]
fn tools_in_first_user_message() {
    init_tracing();
    let mut ctx = base_context(vec![
        ChatMessage::new("user", "  What's the weather in Paris?  "),
        ChatMessage::new("assistant", "Let me check."),
    ]);
    ctx.insert("custom_tools", weather_tools());
    ctx.set_var("date_string", "01 Jan 2025");

    let rendered = render(LLAMA_3_2_TOOLS, &ctx).unwrap();

    assert!(rendered.contains("Today Date: 01 Jan 2025\n\n"));
    assert!(!rendered.contains("You have access to the following functions."));
    let header = rendered
        .find("<|start_header_id|>user<|end_header_id|>\n\n")
        .unwrap();
    let guidance = rendered
        .find("Given the following functions, please respond with a JSON for a function call ")
        .unwrap();
    assert!(header < guidance);
    assert!(rendered.contains("with its proper arguments that best answers the given prompt.\n\n"));
    assert!(rendered.contains("\"name\": \"get_weather\""));
    assert!(rendered.contains("What's the weather in Paris?<|eot_id|>"));
    assert!(rendered.contains(
        "<|start_header_id|>assistant<|end_header_id|>\n\nLet me check.<|eot_id|>"
    ));
    // The first user message moved into the tools block and is not repeated.
    assert_eq!(rendered.matches("What's the weather in Paris?").count(), 1);
}

#[test]
fn no_tools_skips_environment_line() {
    let ctx = base_context(vec![ChatMessage::new("user", "Hi")]);
    let rendered = render(LLAMA_3_2_TOOLS, &ctx).unwrap();

    assert!(!rendered.contains("Environment: ipython"));
    assert!(!rendered.contains("get_weather"));
    let header = Regex::new(r"<\|start_header_id\|>system<\|end_header_id\|>\n+Cutting Knowledge Date").unwrap();
    assert!(header.is_match(&rendered), "{rendered}");
    assert!(rendered.contains("<|start_header_id|>user<|end_header_id|>\n\nHi<|eot_id|>"));
}

#[test]
fn assistant_tool_call_and_tool_result() {
    let mut ctx: Context = serde_json::from_str(
        r#"{
            "bos_token": "",
            "add_generation_prompt": false,
            "messages": [
                {"role": "user", "content": "Weather in Paris?"},
                {"role": "assistant", "content": "", "tool_calls": [
                    {"function": {"name": "get_weather", "arguments": {"city": "Paris"}}}
                ]},
                {"role": "tool", "content": "22C and sunny"}
            ]
        }"#,
    )
    .unwrap();
    ctx.set_flag("tools_in_user_message", false);

    let rendered = render(LLAMA_3_2_TOOLS, &ctx).unwrap();

    assert!(rendered.contains("<|start_header_id|>user<|end_header_id|>\n\nWeather in Paris?<|eot_id|>"));
    assert!(rendered.contains("{\"name\": \"get_weather\", "));
    assert!(rendered.contains("\"parameters\": "));
    assert!(rendered.contains("{\n\"city\": \"Paris\"\n}"));
    assert!(rendered.contains("<|start_header_id|>ipython<|end_header_id|>\n\n"));
    assert!(rendered.contains("22C and sunny"));
    assert!(!rendered
        .trim_end()
        .ends_with("<|start_header_id|>assistant<|end_header_id|>"));
}

#[test]
fn multiple_tool_calls_raise() {
    let ctx: Context = serde_json::from_str(
        r#"{
            "messages": [
                {"role": "assistant", "content": "", "tool_calls": [
                    {"function": {"name": "a", "arguments": {}}},
                    {"function": {"name": "b", "arguments": {}}}
                ]}
            ]
        }"#,
    )
    .unwrap();

    let err = render(LLAMA_3_2_TOOLS, &ctx).unwrap_err();
    assert!(matches!(err, TemplateError::Runtime(_)));
    assert_eq!(
        err.to_string(),
        "This model only supports single tool-calls at once!"
    );
}

#[test]
fn tools_in_user_message_without_messages_raises() {
    let mut ctx = Context::new();
    ctx.insert("custom_tools", weather_tools());
    ctx.set_messages(&[]);

    let err = render(LLAMA_3_2_TOOLS, &ctx).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot put tools in the first user message when there's no first user message!"
    );
}
