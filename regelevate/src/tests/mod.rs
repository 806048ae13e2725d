#[cfg(test)]
mod tests {
    use crate::helpers::*;
    use crate::messages::*;
    use crate::payload::*;
    use crate::{operation_from_matches, regelevate_cli, resolve_operation};
    use std::cell::Cell;

    fn defaults() -> PayloadDefaults {
        PayloadDefaults {
            name: "KeeperConfig".to_string(),
            value: "https://vault.example".to_string(),
        }
    }

    fn parse(args: &[&str]) -> std::result::Result<PayloadOperation, PayloadError> {
        let matches = regelevate_cli()
            .try_get_matches_from(std::iter::once("regelevate").chain(args.iter().copied()))
            .unwrap();
        operation_from_matches(&matches, &defaults())
    }

    #[test]
    fn test_cli_is_well_formed() {
        regelevate_cli().debug_assert();
    }

    #[test]
    fn test_startup_mode_to_u32() {
        assert_eq!(u32::from(StartupMode::ProbeOnly), 0);
        assert_eq!(u32::from(StartupMode::Elevated), 1);
        assert_eq!(u32::from(StartupMode::DifferentUser), 2);
        assert_eq!(u32::from(StartupMode::Escalate), 3);
    }

    #[test]
    fn test_escalation_stage_to_u32() {
        assert_eq!(u32::from(EscalationStage::Normal), 1);
        assert_eq!(u32::from(EscalationStage::Elevated), 2);
        assert_eq!(u32::from(EscalationStage::AlternateUser), 3);
    }

    #[test]
    fn test_outcome_codes() {
        assert_eq!(EscalationOutcome::Granted(EscalationStage::Normal).code(), 0);
        assert_eq!(
            EscalationOutcome::Relaunched(EscalationStage::Elevated).code(),
            1
        );
        assert_eq!(EscalationOutcome::Exhausted.code(), 2);
        assert_eq!(EscalationOutcome::Cancelled.code(), 3);
    }

    #[test]
    fn test_no_subcommand_is_check() {
        assert_eq!(parse(&[]), Ok(PayloadOperation::Check));
        assert_eq!(parse(&["check"]), Ok(PayloadOperation::Check));
    }

    #[test]
    fn test_set_with_everything() {
        assert_eq!(
            parse(&["set", "MyVar", "some value", "--scope", "system"]),
            Ok(PayloadOperation::Set {
                name: "MyVar".to_string(),
                value: "some value".to_string(),
                scope: PayloadTarget::System,
            })
        );
    }

    #[test]
    fn test_set_uses_defaults() {
        assert_eq!(
            parse(&["set"]),
            Ok(PayloadOperation::Set {
                name: "KeeperConfig".to_string(),
                value: "https://vault.example".to_string(),
                scope: PayloadTarget::User,
            })
        );
    }

    #[test]
    fn test_set_without_any_value() {
        let matches = regelevate_cli()
            .try_get_matches_from(["regelevate", "set", "MyVar"])
            .unwrap();
        let no_value = PayloadDefaults {
            name: "KeeperConfig".to_string(),
            value: String::new(),
        };
        assert_eq!(
            operation_from_matches(&matches, &no_value),
            Err(PayloadError::MissingValue("MyVar".to_string()))
        );
    }

    #[test]
    fn test_remove_and_show() {
        assert_eq!(
            parse(&["remove", "--scope", "user"]),
            Ok(PayloadOperation::Remove {
                name: "KeeperConfig".to_string(),
                scope: PayloadTarget::User,
            })
        );
        assert_eq!(
            parse(&["show", "Path"]),
            Ok(PayloadOperation::Show {
                name: "Path".to_string(),
                scope: PayloadTarget::User,
            })
        );
    }

    #[test]
    fn test_empty_name_is_rejected() {
        assert_eq!(parse(&["remove", ""]), Err(PayloadError::EmptyName));
    }

    /// Config as one account sees it. Counts reads, so we can tell whether
    /// anyone looked.
    struct AccountConfig {
        name: &'static str,
        value: &'static str,
        reads: Cell<u32>,
    }

    impl AccountConfig {
        fn new(name: &'static str, value: &'static str) -> Self {
            Self {
                name,
                value,
                reads: Cell::new(0),
            }
        }
    }

    impl ConfigProvider for AccountConfig {
        fn get_variable_name(&self) -> std::result::Result<String, ConfigError> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.name.to_string())
        }
        fn get_variable_value(&self) -> std::result::Result<String, ConfigError> {
            self.reads.set(self.reads.get() + 1);
            Ok(self.value.to_string())
        }
    }

    /// Resolves `args` in the parent, builds the relaunch command line the
    /// privileged instance gets, and resolves that too, under another
    /// account's config.
    fn relaunch_round_trip(
        args: &[&str],
        tag: &str,
    ) -> (PayloadOperation, std::result::Result<PayloadOperation, PayloadError>) {
        let parent_config = AccountConfig::new("MyVar", "https://vault.example");
        let child_config = AccountConfig::new("SomeoneElsesVar", "");

        let parent_args: Vec<&str> = args.to_vec();
        let mode = StartupMode::detect(&parent_args);
        assert_eq!(mode, StartupMode::Escalate);
        let matches = regelevate_cli()
            .try_get_matches_from(std::iter::once("regelevate").chain(parent_args))
            .unwrap();
        let parent = resolve_operation(mode, &matches, &parent_config).unwrap();

        let mut relaunch = vec![tag.to_string()];
        relaunch.extend(parent.to_args());
        let mode = StartupMode::detect(&relaunch);
        assert!(mode.is_privileged());
        let matches = regelevate_cli()
            .try_get_matches_from(std::iter::once("regelevate".to_string()).chain(relaunch))
            .unwrap();
        let child = resolve_operation(mode, &matches, &child_config);
        assert_eq!(child_config.reads.get(), 0);
        (parent, child)
    }

    #[test]
    fn test_relaunch_keeps_configured_defaults() {
        for tag in [ELEVATED_TAG, DIFFERENT_USER_TAG] {
            let (parent, child) = relaunch_round_trip(&["set"], tag);
            assert_eq!(
                parent,
                PayloadOperation::Set {
                    name: "MyVar".to_string(),
                    value: "https://vault.example".to_string(),
                    scope: PayloadTarget::User,
                }
            );
            assert_eq!(child, Ok(parent));
        }
    }

    #[test]
    fn test_relaunch_keeps_explicit_arguments() {
        let (parent, child) = relaunch_round_trip(
            &["set", "--scope", "both", "--", "-dashed", "--elevated"],
            DIFFERENT_USER_TAG,
        );
        assert_eq!(
            parent,
            PayloadOperation::Set {
                name: "-dashed".to_string(),
                value: "--elevated".to_string(),
                scope: PayloadTarget::Both,
            }
        );
        assert_eq!(child, Ok(parent));

        let (parent, child) = relaunch_round_trip(&["remove"], ELEVATED_TAG);
        assert_eq!(
            parent,
            PayloadOperation::Remove {
                name: "MyVar".to_string(),
                scope: PayloadTarget::User,
            }
        );
        assert_eq!(child, Ok(parent));

        let (parent, child) = relaunch_round_trip(&[], ELEVATED_TAG);
        assert_eq!(parent, PayloadOperation::Check);
        assert_eq!(child, Ok(parent));
    }

    #[test]
    fn test_privileged_instance_ignores_its_own_config() {
        // A hand-made relaunch with nothing forwarded: the child has no
        // defaults to fall back on.
        let config = AccountConfig::new("SomeoneElsesVar", "value");
        let matches = regelevate_cli()
            .try_get_matches_from(["regelevate", "--different-user", "set"])
            .unwrap();
        assert_eq!(
            resolve_operation(StartupMode::DifferentUser, &matches, &config),
            Err(PayloadError::EmptyName)
        );
        assert_eq!(config.reads.get(), 0);
    }

    #[test]
    fn test_bad_scope_is_a_usage_error() {
        assert!(regelevate_cli()
            .try_get_matches_from(["regelevate", "set", "A", "b", "--scope", "site"])
            .is_err());
    }
}
