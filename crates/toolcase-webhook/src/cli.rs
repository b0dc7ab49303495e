use clap::builder::PossibleValue;
use clap::{crate_authors, crate_description, crate_name, crate_version, Arg, ArgAction, Command};

use crate::mutation::{MutatorKind, DEFAULT_NODE_ALLOCATABLE_CPU, DEFAULT_TOOL_ANNOTATION_PREFIX};

pub fn build_cli() -> Command {
    let mut args = vec![
        Arg::new("log-level")
            .long("log-level")
            .value_name("LOG_LEVEL")
            .env("TOOLCASE_LOG_LEVEL")
            .default_value("info")
            .value_parser([
                PossibleValue::new("trace"),
                PossibleValue::new("debug"),
                PossibleValue::new("info"),
                PossibleValue::new("warn"),
                PossibleValue::new("error"),
            ])
            .help("Log level"),
        Arg::new("log-fmt")
            .long("log-fmt")
            .value_name("LOG_FMT")
            .env("TOOLCASE_LOG_FMT")
            .default_value("text")
            .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
            .help("Log output format"),
        Arg::new("log-no-color")
            .long("log-no-color")
            .env("NO_COLOR")
            .action(ArgAction::SetTrue)
            .help("Disable colored output for logs"),
        Arg::new("address")
            .long("addr")
            .value_name("BIND_ADDRESS")
            .default_value("0.0.0.0")
            .env("TOOLCASE_BIND_ADDRESS")
            .help("Bind against ADDRESS"),
        // 8443 does not require root privileges, the Service maps it to 443
        Arg::new("port")
            .long("port")
            .value_name("PORT")
            .default_value("8443")
            .env("TOOLCASE_PORT")
            .help("Listen on PORT"),
        Arg::new("cert-file")
            .long("cert-file")
            .value_name("CERT_FILE")
            .default_value("/run/secrets/tls/cert.pem")
            .env("TOOLCASE_CERT_FILE")
            .help("Path to an X.509 certificate file for HTTPS"),
        Arg::new("key-file")
            .long("key-file")
            .value_name("KEY_FILE")
            .default_value("/run/secrets/tls/key.pem")
            .env("TOOLCASE_KEY_FILE")
            .help("Path to an X.509 private key file for HTTPS"),
        Arg::new("tool-config")
            .long("tool-config")
            .value_name("TOOL_CONFIG_FILE")
            .default_value("/etc/tool/tool.config")
            .env("TOOLCASE_TOOL_CONFIG")
            .help("JSON file holding the image that ships the tools and the path of each tool"),
        Arg::new("init-container-config")
            .long("init-container-config")
            .value_name("INIT_CONTAINER_CONFIG_FILE")
            .default_value("./json/initContainerConfig.json")
            .env("TOOLCASE_INIT_CONTAINER_CONFIG")
            .help("JSON file describing the injected init container. Built-in defaults are used when the file does not exist"),
        Arg::new("mutators")
            .long("mutators")
            .value_name("MUTATORS")
            .env("TOOLCASE_MUTATORS")
            .default_value(MutatorKind::PodTools.as_str())
            .value_delimiter(',')
            .action(ArgAction::Append)
            .value_parser(MutatorKind::ALL.map(|kind| PossibleValue::new(kind.as_str())))
            .help("Comma separated list of the mutators to enable"),
        Arg::new("tool-annotation-prefix")
            .long("tool-annotation-prefix")
            .value_name("PREFIX")
            .default_value(DEFAULT_TOOL_ANNOTATION_PREFIX)
            .env("TOOLCASE_TOOL_ANNOTATION_PREFIX")
            .help("Pods request a tool with the `<PREFIX>/<tool>: \"true\"` annotation"),
        Arg::new("node-allocatable-cpu")
            .long("node-allocatable-cpu")
            .value_name("QUANTITY")
            .default_value(DEFAULT_NODE_ALLOCATABLE_CPU)
            .env("TOOLCASE_NODE_ALLOCATABLE_CPU")
            .help("Allocatable CPU written into the status of every Node"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
