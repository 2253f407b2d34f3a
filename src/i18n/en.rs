//! 英文消息

use super::messages::*;

/// 获取英文消息
pub fn get(key: &str) -> &'static str {
    match key {
        // 词法错误
        ERR_SCAN_UNEXPECTED_CHAR => "Unexpected character '{}'.",
        ERR_SCAN_UNTERMINATED_STRING => "Unterminated string.",
        ERR_SCAN_INVALID_NUMBER => "Invalid number '{}'.",

        // 编译错误
        ERR_COMPILE_EXPECTED_TOKEN => "Expected '{}'.",
        ERR_COMPILE_EXPECTED_EXPRESSION => "Expected expression.",
        ERR_COMPILE_EXPECTED_IDENTIFIER => "Expected {} name.",
        ERR_COMPILE_DUPLICATE_VARIABLE => "Variable '{}' is already defined in this scope.",
        ERR_COMPILE_READ_OWN_INITIALIZER => "Can't read a variable in its own initializer.",
        ERR_COMPILE_TOO_MANY_CONSTANTS => "Too many constants in one chunk.",
        ERR_COMPILE_TOO_MANY_LOCALS => "Too many local variables in function.",
        ERR_COMPILE_TOO_MANY_UPVALUES => "Too many captured variables in function.",
        ERR_COMPILE_TOO_MANY_ARGS => "Can't have more than 255 arguments.",
        ERR_COMPILE_TOO_MANY_PARAMS => "Can't have more than 255 parameters.",
        ERR_COMPILE_TOO_MANY_LIST_ITEMS => "Can't have more than 255 items in a list literal.",
        ERR_COMPILE_JUMP_TOO_LARGE => "Too much code to jump over.",
        ERR_COMPILE_LOOP_TOO_LARGE => "Loop body too large.",
        ERR_COMPILE_INVALID_ASSIGNMENT => "Invalid assignment target.",
        ERR_COMPILE_INVALID_INCREMENT => "Increment target must be a variable.",
        ERR_COMPILE_RETURN_TOP_LEVEL => "Can't return from top-level code.",
        ERR_COMPILE_RETURN_FROM_INIT => "Can't return a value from an initializer.",
        ERR_COMPILE_THIS_OUTSIDE_CLASS => "Can't use '这' outside of a class.",
        ERR_COMPILE_SUPER_OUTSIDE_CLASS => "Can't use '超' outside of a class.",
        ERR_COMPILE_SUPER_NO_SUPERCLASS => "Can't use '超' in a class with no superclass.",
        ERR_COMPILE_SELF_INHERIT => "A class can't inherit from itself.",

        // 运行时错误
        ERR_RUNTIME_ARITY => "Expected {} arguments but got {}.",
        ERR_RUNTIME_ARITY_RANGE => "Expected {} to {} arguments but got {}.",
        ERR_RUNTIME_STACK_OVERFLOW => "Stack overflow.",
        ERR_RUNTIME_NOT_CALLABLE => "Can only call functions and classes.",
        ERR_RUNTIME_UNDEFINED_VARIABLE => "Undefined variable '{}'.",
        ERR_RUNTIME_UNDEFINED_PROPERTY => "Undefined property '{}'.",
        ERR_RUNTIME_OPERANDS_NUMBERS => "Operands must be numbers.",
        ERR_RUNTIME_OPERANDS_ADD => "Operands must be two numbers or two strings.",
        ERR_RUNTIME_ONLY_INSTANCES_PROPS => "Only instances have properties.",
        ERR_RUNTIME_ONLY_INSTANCES_FIELDS => "Only instances have fields.",
        ERR_RUNTIME_STATIC_FIELD => "Can't modify a constant property.",
        ERR_RUNTIME_SUPERCLASS_NOT_CLASS => "Superclass must be a class.",
        ERR_RUNTIME_ONLY_METHODS => "Only instances, strings and lists have methods.",
        ERR_RUNTIME_ARG_TYPE => "Argument {} ({}) must be of type '{}', not '{}'.",
        ERR_RUNTIME_STRING_INDEX_NAN => "String index is not a number.",
        ERR_RUNTIME_STRING_INDEX_RANGE => "String index out of range.",
        ERR_RUNTIME_LIST_INDEX_NAN => "List index is not a number.",
        ERR_RUNTIME_LIST_INDEX_RANGE => "List index out of range.",
        ERR_RUNTIME_INVALID_INDEX_TARGET => "Only strings and lists can be indexed.",
        ERR_RUNTIME_STRING_IMMUTABLE => "Strings are immutable.",
        ERR_RUNTIME_STORE_TARGET => "Cannot store value: target is not a list.",
        ERR_RUNTIME_INVALID_ARG_INDEX => "Argument {} is not a valid index.",
        ERR_RUNTIME_SUBSTRING_ORDER => "End index cannot come before start index.",
        ERR_RUNTIME_POP_EMPTY => "Cannot pop from an empty list.",
        ERR_RUNTIME_CALLBACK_ARITY => "Input function expects {} arguments but takes {}.",
        ERR_RUNTIME_SORT_NUMBERS => "List elements must be numbers when no comparator is given.",
        ERR_RUNTIME_SORT_CMP_NUMBER => "Comparator must return a number.",
        ERR_RUNTIME_CHUNK_END => "Unexpected end of bytecode.",

        // 诊断格式
        MSG_DIAG_LINE => "[line {}] {}",
        MSG_DIAG_AT => "Error at '{}': {}",
        MSG_DIAG_AT_END => "Error at end: {}",
        MSG_TRACE_LINE => "[line {}] in {}",
        MSG_TRACE_SCRIPT => "script",
        MSG_TRACE_FUN => "{}()",

        // CLI 消息
        MSG_CLI_USAGE => "Usage: {} [script]",
        MSG_CLI_CANNOT_READ_FILE => "Cannot read file '{}': {}",
        MSG_CLI_REPL_BANNER => "{} language {} (Ctrl-D to exit)",

        _ => "Unknown message key",
    }
}
