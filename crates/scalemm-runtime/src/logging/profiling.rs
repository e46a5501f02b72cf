use core::fmt::Display;
use core::time::Duration;
use hashbrown::HashMap;

/// Accumulated durations of the kernels executed by a queue.
#[derive(Debug, Default)]
pub(crate) struct Profiled {
    durations: HashMap<String, ProfileItem>,
}

#[derive(Debug, Default, Clone)]
pub(crate) struct ProfileItem {
    total_duration: Duration,
    num_computed: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Control the amount of info being displayed when profiling.
pub enum ProfileLevel {
    /// Only the summary table.
    Basic,
    /// The summary table and every kernel duration.
    Medium,
    /// The summary table and every kernel duration with its full name.
    Full,
}

impl Profiled {
    /// If some computation was profiled.
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn update(&mut self, name: &str, duration: Duration) {
        let name = name.lines().next().unwrap_or(name);

        match self.durations.get_mut(name) {
            Some(item) => item.update(duration),
            None => {
                self.durations.insert(
                    name.to_string(),
                    ProfileItem {
                        total_duration: duration,
                        num_computed: 1,
                    },
                );
            }
        }
    }
}

impl ProfileItem {
    fn update(&mut self, duration: Duration) {
        self.total_duration += duration;
        self.num_computed += 1;
    }
}

impl Display for Profiled {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let header_name = "Name";
        let header_num_computed = "Num Computed";
        let header_duration = "Duration";
        let header_ratio = "Ratio";

        let mut name_len = header_name.len();
        let mut num_computed_len = header_num_computed.len();
        let mut duration_len = header_duration.len();

        let mut total_duration = Duration::ZERO;
        let mut total_computed = 0;

        let mut items: Vec<(String, String, String, Duration)> = self
            .durations
            .iter()
            .map(|(name, item)| {
                let num_computed = format!("{}", item.num_computed);
                let duration = format!("{:?}", item.total_duration);

                name_len = name_len.max(name.len());
                num_computed_len = num_computed_len.max(num_computed.len());
                duration_len = duration_len.max(duration.len());

                total_duration += item.total_duration;
                total_computed += item.num_computed;

                (name.clone(), num_computed, duration, item.total_duration)
            })
            .collect();
        items.sort_by(|(_, _, _, a), (_, _, _, b)| b.cmp(a));

        let total_duration_fmt = format!("{total_duration:?}");
        let total_computed_fmt = format!("{total_computed}");
        let total_ratio_fmt = "100 %";

        duration_len = duration_len.max(total_duration_fmt.len());
        num_computed_len = num_computed_len.max(total_computed_fmt.len());
        let ratio_len = header_ratio.len().max(total_ratio_fmt.len());

        let line_length = name_len + duration_len + num_computed_len + ratio_len + 11;
        let write_line = |char: &str, f: &mut core::fmt::Formatter<'_>| {
            writeln!(f, "|{}|", char.repeat(line_length))
        };
        let write_row = |columns: [&str; 4], f: &mut core::fmt::Formatter<'_>| {
            writeln!(
                f,
                "| {:<name_len$} | {:<duration_len$} | {:<num_computed_len$} | {:<ratio_len$} |",
                columns[0], columns[1], columns[2], columns[3],
            )
        };

        write_line("⎺", f)?;
        write_row(
            [header_name, header_duration, header_num_computed, header_ratio],
            f,
        )?;
        write_line("⎼", f)?;

        for (name, num_computed, duration, total) in items {
            let ratio = match total_duration.as_nanos() {
                0 => 0,
                all => 100 * total.as_nanos() / all,
            };
            write_row([&name, &duration, &num_computed, &format!("{ratio} %")], f)?;
        }

        write_line("⎼", f)?;
        write_row(
            [
                "Total",
                &total_duration_fmt,
                &total_computed_fmt,
                total_ratio_fmt,
            ],
            f,
        )?;
        write_line("⎯", f)
    }
}
