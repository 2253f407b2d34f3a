//! 消息键定义
//!
//! 每个键对应 zh/en 各一条消息，占位符用 {}

// ============ 词法错误 ============
pub const ERR_SCAN_UNEXPECTED_CHAR: &str = "err.scan.unexpected_char";
pub const ERR_SCAN_UNTERMINATED_STRING: &str = "err.scan.unterminated_string";
pub const ERR_SCAN_INVALID_NUMBER: &str = "err.scan.invalid_number";

// ============ 编译错误 ============
pub const ERR_COMPILE_EXPECTED_TOKEN: &str = "err.compile.expected_token";
pub const ERR_COMPILE_EXPECTED_EXPRESSION: &str = "err.compile.expected_expression";
pub const ERR_COMPILE_EXPECTED_IDENTIFIER: &str = "err.compile.expected_identifier";
pub const ERR_COMPILE_DUPLICATE_VARIABLE: &str = "err.compile.duplicate_variable";
pub const ERR_COMPILE_READ_OWN_INITIALIZER: &str = "err.compile.read_own_initializer";
pub const ERR_COMPILE_TOO_MANY_CONSTANTS: &str = "err.compile.too_many_constants";
pub const ERR_COMPILE_TOO_MANY_LOCALS: &str = "err.compile.too_many_locals";
pub const ERR_COMPILE_TOO_MANY_UPVALUES: &str = "err.compile.too_many_upvalues";
pub const ERR_COMPILE_TOO_MANY_ARGS: &str = "err.compile.too_many_args";
pub const ERR_COMPILE_TOO_MANY_PARAMS: &str = "err.compile.too_many_params";
pub const ERR_COMPILE_TOO_MANY_LIST_ITEMS: &str = "err.compile.too_many_list_items";
pub const ERR_COMPILE_JUMP_TOO_LARGE: &str = "err.compile.jump_too_large";
pub const ERR_COMPILE_LOOP_TOO_LARGE: &str = "err.compile.loop_too_large";
pub const ERR_COMPILE_INVALID_ASSIGNMENT: &str = "err.compile.invalid_assignment";
pub const ERR_COMPILE_INVALID_INCREMENT: &str = "err.compile.invalid_increment";
pub const ERR_COMPILE_RETURN_TOP_LEVEL: &str = "err.compile.return_top_level";
pub const ERR_COMPILE_RETURN_FROM_INIT: &str = "err.compile.return_from_init";
pub const ERR_COMPILE_THIS_OUTSIDE_CLASS: &str = "err.compile.this_outside_class";
pub const ERR_COMPILE_SUPER_OUTSIDE_CLASS: &str = "err.compile.super_outside_class";
pub const ERR_COMPILE_SUPER_NO_SUPERCLASS: &str = "err.compile.super_no_superclass";
pub const ERR_COMPILE_SELF_INHERIT: &str = "err.compile.self_inherit";

// ============ 运行时错误 ============
pub const ERR_RUNTIME_ARITY: &str = "err.runtime.arity";
pub const ERR_RUNTIME_ARITY_RANGE: &str = "err.runtime.arity_range";
pub const ERR_RUNTIME_STACK_OVERFLOW: &str = "err.runtime.stack_overflow";
pub const ERR_RUNTIME_NOT_CALLABLE: &str = "err.runtime.not_callable";
pub const ERR_RUNTIME_UNDEFINED_VARIABLE: &str = "err.runtime.undefined_variable";
pub const ERR_RUNTIME_UNDEFINED_PROPERTY: &str = "err.runtime.undefined_property";
pub const ERR_RUNTIME_OPERANDS_NUMBERS: &str = "err.runtime.operands_numbers";
pub const ERR_RUNTIME_OPERANDS_ADD: &str = "err.runtime.operands_add";
pub const ERR_RUNTIME_ONLY_INSTANCES_PROPS: &str = "err.runtime.only_instances_props";
pub const ERR_RUNTIME_ONLY_INSTANCES_FIELDS: &str = "err.runtime.only_instances_fields";
pub const ERR_RUNTIME_STATIC_FIELD: &str = "err.runtime.static_field";
pub const ERR_RUNTIME_SUPERCLASS_NOT_CLASS: &str = "err.runtime.superclass_not_class";
pub const ERR_RUNTIME_ONLY_METHODS: &str = "err.runtime.only_methods";
pub const ERR_RUNTIME_ARG_TYPE: &str = "err.runtime.arg_type";
pub const ERR_RUNTIME_STRING_INDEX_NAN: &str = "err.runtime.string_index_nan";
pub const ERR_RUNTIME_STRING_INDEX_RANGE: &str = "err.runtime.string_index_range";
pub const ERR_RUNTIME_LIST_INDEX_NAN: &str = "err.runtime.list_index_nan";
pub const ERR_RUNTIME_LIST_INDEX_RANGE: &str = "err.runtime.list_index_range";
pub const ERR_RUNTIME_INVALID_INDEX_TARGET: &str = "err.runtime.invalid_index_target";
pub const ERR_RUNTIME_STRING_IMMUTABLE: &str = "err.runtime.string_immutable";
pub const ERR_RUNTIME_STORE_TARGET: &str = "err.runtime.store_target";
pub const ERR_RUNTIME_INVALID_ARG_INDEX: &str = "err.runtime.invalid_arg_index";
pub const ERR_RUNTIME_SUBSTRING_ORDER: &str = "err.runtime.substring_order";
pub const ERR_RUNTIME_POP_EMPTY: &str = "err.runtime.pop_empty";
pub const ERR_RUNTIME_CALLBACK_ARITY: &str = "err.runtime.callback_arity";
pub const ERR_RUNTIME_SORT_NUMBERS: &str = "err.runtime.sort_numbers";
pub const ERR_RUNTIME_SORT_CMP_NUMBER: &str = "err.runtime.sort_cmp_number";
pub const ERR_RUNTIME_CHUNK_END: &str = "err.runtime.chunk_end";

// ============ 诊断格式 ============
pub const MSG_DIAG_LINE: &str = "msg.diag.line";
pub const MSG_DIAG_AT: &str = "msg.diag.at";
pub const MSG_DIAG_AT_END: &str = "msg.diag.at_end";
pub const MSG_TRACE_LINE: &str = "msg.trace.line";
pub const MSG_TRACE_SCRIPT: &str = "msg.trace.script";
pub const MSG_TRACE_FUN: &str = "msg.trace.fun";

// ============ CLI 消息 ============
pub const MSG_CLI_USAGE: &str = "msg.cli.usage";
pub const MSG_CLI_CANNOT_READ_FILE: &str = "msg.cli.cannot_read_file";
pub const MSG_CLI_REPL_BANNER: &str = "msg.cli.repl_banner";
