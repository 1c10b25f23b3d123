use super::results::{CollectionStatus, CommandResults};

/// Derives the collection status of a device from its command results.
///
/// `Failed` is never produced here: it belongs to devices whose session could
/// not be established, which never reach classification.
pub fn classify(commands_configured: bool, commands: &CommandResults) -> CollectionStatus {
    if !commands_configured {
        return CollectionStatus::NoCommandsForPlatform;
    }
    // every attempted command is recorded, so this only guards direct callers
    if commands.is_empty() {
        return CollectionStatus::AllCommandsFailedExecution;
    }

    let any_failed = commands.values().any(|result| result.failed());
    let all_failed = commands.values().all(|result| result.failed());

    match (any_failed, all_failed) {
        (_, true) => CollectionStatus::AllCommandsFailedExecution,
        (true, false) => CollectionStatus::PartialSuccess,
        (false, false) => CollectionStatus::Success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::results::CommandResult;
    use std::time::Duration;

    fn results(outcomes: &[bool]) -> CommandResults {
        outcomes
            .iter()
            .enumerate()
            .map(|(index, failed)| {
                let name = format!("command_{}", index);
                let result = if *failed {
                    CommandResult::execution_failed(&name, "timed out".to_owned(), Duration::ZERO)
                } else {
                    CommandResult::completed(&name, "ok".to_owned(), Duration::ZERO, None)
                };
                (name, result)
            })
            .collect()
    }

    #[test]
    fn test_classify_table() {
        let cases: Vec<(bool, Vec<bool>, CollectionStatus)> = vec![
            (false, vec![], CollectionStatus::NoCommandsForPlatform),
            (true, vec![], CollectionStatus::AllCommandsFailedExecution),
            (true, vec![false], CollectionStatus::Success),
            (true, vec![false, false, false], CollectionStatus::Success),
            (true, vec![true], CollectionStatus::AllCommandsFailedExecution),
            (true, vec![true, true], CollectionStatus::AllCommandsFailedExecution),
            (true, vec![false, true], CollectionStatus::PartialSuccess),
            (true, vec![true, false, false], CollectionStatus::PartialSuccess),
        ];

        for (configured, outcomes, expected) in cases {
            assert_eq!(
                classify(configured, &results(&outcomes)),
                expected,
                "configured: {}, outcomes: {:?}",
                configured,
                outcomes
            );
        }
    }

    #[test]
    fn test_parse_errors_do_not_count_as_failures() {
        let mut commands = CommandResults::new();
        commands.insert(
            "arp".to_owned(),
            CommandResult::completed(
                "show ip arp",
                "unparseable".to_owned(),
                Duration::ZERO,
                Some(crate::collector::results::ParseOutcome::Failed("bad template".to_owned())),
            ),
        );

        assert_eq!(classify(true, &commands), CollectionStatus::Success);
    }

    #[test]
    fn test_misconfigured_commands_count_as_failures() {
        let mut commands = results(&[false]);
        commands.insert("broken".to_owned(), CommandResult::misconfigured("broken"));

        assert_eq!(classify(true, &commands), CollectionStatus::PartialSuccess);
    }

    #[test]
    fn test_configuration_flag_wins_over_results() {
        assert_eq!(
            classify(false, &results(&[false])),
            CollectionStatus::NoCommandsForPlatform
        );
    }
}
