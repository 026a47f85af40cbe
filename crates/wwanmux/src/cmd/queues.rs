use serde::Serialize;
use wwanmux_channel::{config_for_tag, ChannelRole, MODEM_CHANNELS};
use wwanmux_core::{select_queue, INVALID_QUEUE};
use wwanmux_frame::{tag_class, tag_class_name, TagClass, DATA_TAG_END, ROOT_TAG};

use crate::cmd::QueuesArgs;
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::{new_table, print_json, schema_id, OutputFormat};

#[derive(Serialize)]
struct QueueRow {
    tag: u16,
    class: TagClass,
    /// `None` when no transmit queue carries the tag.
    queue: Option<u16>,
    channel: Option<ChannelRole>,
    ul_pipe: Option<u32>,
    dl_pipe: Option<u32>,
    ul_tds: Option<u32>,
    dl_tds: Option<u32>,
}

#[derive(Serialize)]
struct QueuesOutput {
    schema_id: String,
    max_sessions: usize,
    tx_queues: usize,
    queues: Vec<QueueRow>,
}

pub fn run(args: QueuesArgs, format: OutputFormat) -> CliResult<i32> {
    if args.max_sessions == 0 || args.max_sessions > usize::from(DATA_TAG_END) {
        return Err(CliError::new(
            USAGE,
            format!("--max-sessions must be in 1..={DATA_TAG_END}"),
        ));
    }

    let tags = args
        .tags
        .clone()
        .unwrap_or_else(|| default_tags(args.max_sessions));
    let queues = tags
        .into_iter()
        .map(|tag| queue_row(tag, args.max_sessions))
        .collect();

    let out = QueuesOutput {
        schema_id: schema_id("queue-map"),
        max_sessions: args.max_sessions,
        tx_queues: 1 + args.max_sessions,
        queues,
    };
    print_queues(&out, format);
    Ok(SUCCESS)
}

/// Root tag, every IP session tag, then the control tags with a dedicated
/// channel.
fn default_tags(max_sessions: usize) -> Vec<u16> {
    let mut tags = vec![ROOT_TAG];
    tags.extend((1..=DATA_TAG_END).take(max_sessions));
    tags.extend(MODEM_CHANNELS.iter().filter_map(|config| match config.role {
        ChannelRole::Control(tag) => Some(tag),
        _ => None,
    }));
    tags
}

fn queue_row(tag: u16, max_sessions: usize) -> QueueRow {
    let class = tag_class(tag);
    let queue = Some(select_queue(Some(tag), max_sessions)).filter(|q| *q != INVALID_QUEUE);
    let config = matches!(class, TagClass::Data | TagClass::Control).then(|| config_for_tag(tag));
    QueueRow {
        tag,
        class,
        queue,
        channel: config.map(|c| c.role),
        ul_pipe: config.map(|c| c.ul_pipe),
        dl_pipe: config.map(|c| c.dl_pipe),
        ul_tds: config.map(|c| c.ul_nr_of_entries),
        dl_tds: config.map(|c| c.dl_nr_of_entries),
    }
}

fn print_queues(out: &QueuesOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "TAG", "CLASS", "QUEUE", "CHANNEL", "UL PIPE", "DL PIPE", "UL TDS", "DL TDS",
            ]);
            for row in &out.queues {
                table.add_row(vec![
                    row.tag.to_string(),
                    tag_class_name(row.tag).to_string(),
                    opt(row.queue),
                    row.channel.map(role_name).unwrap_or_else(|| "-".to_string()),
                    opt(row.ul_pipe),
                    opt(row.dl_pipe),
                    opt(row.ul_tds),
                    opt(row.dl_tds),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} TX queues for {} IP sessions:",
                out.tx_queues, out.max_sessions
            );
            for row in &out.queues {
                println!(
                    "  tag {:>3} ({:<7}) -> queue {}",
                    row.tag,
                    tag_class_name(row.tag),
                    opt(row.queue)
                );
            }
        }
    }
}

fn role_name(role: ChannelRole) -> String {
    match role {
        ChannelRole::Flash => "flash".to_string(),
        ChannelRole::Mbim => "mbim".to_string(),
        ChannelRole::Control(tag) => format!("control-{tag}"),
        ChannelRole::IpMux => "ip-mux".to_string(),
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tags_cover_root_data_and_control() {
        assert_eq!(default_tags(2), vec![0, 1, 2, 257, 258, 259, 260, 261]);
    }

    #[test]
    fn rows_follow_queue_selection() {
        let root = queue_row(0, 4);
        assert_eq!(root.queue, Some(0));
        assert!(root.channel.is_none());

        let data = queue_row(3, 4);
        assert_eq!(data.queue, Some(3));
        assert_eq!(data.channel, Some(ChannelRole::IpMux));

        let beyond = queue_row(5, 4);
        assert_eq!(beyond.queue, None);

        let at = queue_row(258, 4);
        assert_eq!(at.queue, Some(0));
        assert_eq!(at.ul_tds, Some(4));

        assert_eq!(queue_row(256, 4).class, TagClass::Invalid);
    }
}
