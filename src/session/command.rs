//! Argument builder for the SSM port-forwarding child command.

/// Build args for:
/// `aws ssm start-session --document-name AWS-StartPortForwardingSessionToRemoteHost`
///
/// The returned vector is everything after the `aws` program name. No
/// shell interpolation happens anywhere downstream; the argv is passed to
/// the process spawner as-is.
pub fn build_port_forward_args(
    target_instance_id: &str,
    remote_host: &str,
    remote_port: u16,
    local_port: u16,
    region: &str,
    profile: &str,
) -> Vec<String> {
    let mut args = vec![
        "ssm".to_string(),
        "start-session".to_string(),
        "--target".to_string(),
        target_instance_id.to_string(),
        "--document-name".to_string(),
        "AWS-StartPortForwardingSessionToRemoteHost".to_string(),
        "--parameters".to_string(),
        format!(
            "host=[\"{}\"],portNumber=[\"{}\"],localPortNumber=[\"{}\"]",
            remote_host, remote_port, local_port
        ),
    ];

    if !region.is_empty() {
        args.push("--region".to_string());
        args.push(region.to_string());
    }
    if !profile.is_empty() {
        args.push("--profile".to_string());
        args.push(profile.to_string());
    }

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_args_without_region_or_profile() {
        let args = build_port_forward_args("i-0abc", "db.internal", 5432, 55432, "", "");

        assert_eq!(
            args,
            vec![
                "ssm",
                "start-session",
                "--target",
                "i-0abc",
                "--document-name",
                "AWS-StartPortForwardingSessionToRemoteHost",
                "--parameters",
                "host=[\"db.internal\"],portNumber=[\"5432\"],localPortNumber=[\"55432\"]",
            ]
        );
    }

    #[test]
    fn region_and_profile_appended_when_set() {
        let args =
            build_port_forward_args("i-0abc", "db.internal", 5432, 55432, "us-east-1", "staging");

        assert_eq!(
            &args[8..],
            &[
                "--region".to_string(),
                "us-east-1".to_string(),
                "--profile".to_string(),
                "staging".to_string(),
            ]
        );
    }

    #[test]
    fn profile_without_region() {
        let args = build_port_forward_args("i-0abc", "db.internal", 5432, 55432, "", "staging");

        assert!(!args.contains(&"--region".to_string()));
        assert_eq!(&args[8..], &["--profile".to_string(), "staging".to_string()]);
    }
}
