//! Descriptor of the engine's command service.
//!
//! Mirrors the shape the real engine advertises over reflection: a `run`
//! method taking a command enum plus a JSON config string and answering with
//! a `result` oneof, and an argument-free `ping`.

use prost::Message;
use prost_types::{
    DescriptorProto,
    EnumDescriptorProto,
    EnumValueDescriptorProto,
    FieldDescriptorProto,
    FileDescriptorProto,
    FileDescriptorSet,
    MethodDescriptorProto,
    OneofDescriptorProto,
    ServiceDescriptorProto,
    field_descriptor_proto::{Label, Type},
};

/// Protobuf package of the command service.
pub const PACKAGE: &str = "shai.cmdExecutor";
/// Fully qualified command service name.
pub const SERVICE_NAME: &str = "shai.cmdExecutor.CmdExecutor";
/// File the service is declared in.
pub const FILE_NAME: &str = "cmdExecutor.proto";

/// `Cmd.CHECK`.
pub const CMD_CHECK: i32 = 1;
/// `Cmd.TYPECHECK`.
pub const CMD_TYPECHECK: i32 = 2;
/// `Cmd.SIMULATE`.
pub const CMD_SIMULATE: i32 = 3;

/// `CmdErrorType.UNEXPECTED`.
pub const ERROR_UNEXPECTED: i32 = 0;
/// `CmdErrorType.PASS_FAILURE`.
pub const ERROR_PASS_FAILURE: i32 = 1;

fn enum_type(name: &str, values: &[(&str, i32)]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_owned()),
        value: values
            .iter()
            .map(|(value, number)| EnumValueDescriptorProto {
                name: Some((*value).to_owned()),
                number: Some(*number),
                options: None,
            })
            .collect(),
        ..EnumDescriptorProto::default()
    }
}

fn field(name: &str, number: i32, kind: Type, type_name: Option<&str>) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_owned()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(kind as i32),
        type_name: type_name.map(|local| format!(".{PACKAGE}.{local}")),
        json_name: Some(name.to_owned()),
        ..FieldDescriptorProto::default()
    }
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_owned()),
        field: fields,
        ..DescriptorProto::default()
    }
}

fn method(name: &str, input: &str, output: &str) -> MethodDescriptorProto {
    MethodDescriptorProto {
        name: Some(name.to_owned()),
        input_type: Some(format!(".{PACKAGE}.{input}")),
        output_type: Some(format!(".{PACKAGE}.{output}")),
        ..MethodDescriptorProto::default()
    }
}

/// The command service file descriptor.
#[must_use]
pub fn cmd_executor_file() -> FileDescriptorProto {
    let in_result = |mut member: FieldDescriptorProto| {
        member.oneof_index = Some(0);
        member
    };
    let response = DescriptorProto {
        oneof_decl: vec![OneofDescriptorProto {
            name: Some("result".to_owned()),
            options: None,
        }],
        ..message(
            "CmdResponse",
            vec![
                in_result(field("success", 1, Type::String, None)),
                in_result(field("failure", 2, Type::Message, Some("CmdError"))),
            ],
        )
    };
    FileDescriptorProto {
        name: Some(FILE_NAME.to_owned()),
        package: Some(PACKAGE.to_owned()),
        message_type: vec![
            message(
                "CmdRequest",
                vec![
                    field("cmd", 1, Type::Enum, Some("Cmd")),
                    field("config", 2, Type::String, None),
                ],
            ),
            message(
                "CmdError",
                vec![
                    field("errorType", 1, Type::Enum, Some("CmdErrorType")),
                    field("data", 2, Type::String, None),
                ],
            ),
            response,
            message("PingRequest", Vec::new()),
            message("PongResponse", Vec::new()),
        ],
        enum_type: vec![
            enum_type(
                "Cmd",
                &[
                    ("PARSE", 0),
                    ("CHECK", CMD_CHECK),
                    ("TYPECHECK", CMD_TYPECHECK),
                    ("SIMULATE", CMD_SIMULATE),
                ],
            ),
            enum_type(
                "CmdErrorType",
                &[
                    ("UNEXPECTED", ERROR_UNEXPECTED),
                    ("PASS_FAILURE", ERROR_PASS_FAILURE),
                ],
            ),
        ],
        service: vec![ServiceDescriptorProto {
            name: Some("CmdExecutor".to_owned()),
            method: vec![
                method("run", "CmdRequest", "CmdResponse"),
                method("ping", "PingRequest", "PongResponse"),
            ],
            options: None,
        }],
        syntax: Some("proto3".to_owned()),
        ..FileDescriptorProto::default()
    }
}

/// The command service as a descriptor set, as reflection servers register it.
#[must_use]
pub fn cmd_executor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![cmd_executor_file()],
    }
}

/// Encoded form of [`cmd_executor_set`].
#[must_use]
pub fn encoded_cmd_executor_set() -> Vec<u8> { cmd_executor_set().encode_to_vec() }
