use std::fmt::Write;

use crate::attendance::week_percent;
use crate::models::ClassSummary;
use crate::recurrence::format_date_br;

pub fn build_report(summary: &ClassSummary, min_percent: u32) -> String {
    let mut output = String::new();
    let schedule = &summary.schedule;
    let weekday = schedule
        .weekday
        .map(|w| w.label().to_string())
        .unwrap_or_else(|| "Dia não definido".to_string());

    let _ = writeln!(
        output,
        "# Frequência: {} ({})",
        summary.class_name, summary.class_code
    );
    let _ = writeln!(output, "- Dia da aula: {weekday}");
    let _ = writeln!(output, "- Início: {}", format_date_br(schedule.start_date));
    let _ = writeln!(output, "- Término: {}", format_date_br(schedule.end_date));
    let _ = writeln!(output, "- Alunos matriculados: {}", summary.enrolled);
    let _ = writeln!(
        output,
        "- Frequência média dos alunos: {:.1}%",
        summary.average_percent
    );
    let _ = writeln!(
        output,
        "- Frequência média semanal: {:.1}%",
        summary.weekly_average
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Calendário de aulas");

    if summary.occurrences.is_empty() {
        let _ = writeln!(output, "Nenhuma aula no período definido.");
    } else {
        for (idx, date) in summary.occurrences.iter().enumerate() {
            let _ = writeln!(output, "{}. {}", idx + 1, format_date_br(Some(*date)));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Frequência por aluno");

    if summary.students.is_empty() {
        let _ = writeln!(output, "Nenhum aluno matriculado.");
    } else {
        let _ = writeln!(output, "| Aluno | Presenças | Aulas | Frequência |");
        let _ = writeln!(output, "|---|---|---|---|");
        for student in &summary.students {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {}% |",
                student.full_name, student.present, student.total, student.percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Presença semanal");

    if summary.weekly.is_empty() {
        let _ = writeln!(output, "Nenhuma semana registrada.");
    } else {
        let _ = writeln!(output, "| Semana | Presentes | Frequência |");
        let _ = writeln!(output, "|---|---|---|");
        for (week, count) in &summary.weekly {
            match count {
                Some(present) => {
                    let _ = writeln!(
                        output,
                        "| {week} | {present} | {:.1}% |",
                        week_percent(*present, summary.enrolled)
                    );
                }
                None => {
                    let _ = writeln!(output, "| {week} | — | — |");
                }
            }
        }
    }

    let below: Vec<_> = summary
        .students
        .iter()
        .filter(|s| s.below_threshold)
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Abaixo de {min_percent}%");

    if below.is_empty() {
        let _ = writeln!(output, "Nenhum aluno abaixo do mínimo.");
    } else {
        for student in below {
            let _ = writeln!(
                output,
                "- {} ({}): {}%",
                student.full_name, student.email, student.percent
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::summarize_class;
    use crate::models::{
        AttendanceRecord, AttendanceStatus, ClassRecord, RosterEntry, ScheduleDescriptor,
        WeeklyRecords,
    };
    use uuid::Uuid;

    fn class(end_date: Option<&str>) -> ClassRecord {
        ClassRecord {
            id: Uuid::new_v4(),
            code: "LAB-QUI".to_string(),
            name: "Laboratório de Química".to_string(),
            schedule: ScheduleDescriptor::parse(Some("Quinta-feira"), Some("2024-01-01"), end_date),
        }
    }

    fn roster() -> Vec<RosterEntry> {
        let mut record = AttendanceRecord::new();
        record.insert("2024-01-04".to_string(), AttendanceStatus::Present);
        record.insert("2024-01-11".to_string(), AttendanceStatus::Absent);
        vec![RosterEntry {
            full_name: "Ana Souza".to_string(),
            email: "ana@escola.example".to_string(),
            record,
        }]
    }

    #[test]
    fn report_lists_calendar_and_students() {
        let class = class(Some("2024-01-25"));
        let weekly = WeeklyRecords::new();
        let summary = summarize_class(&class, &roster(), &weekly, 75, None);
        let report = build_report(&summary, 75);

        assert!(report.contains("# Frequência: Laboratório de Química"));
        assert!(report.contains("(LAB-QUI)"));
        assert!(report.contains("- Dia da aula: Quinta-feira"));
        assert!(report.contains("- Término: 25/01/2024"));
        assert!(report.contains("1. 04/01/2024"));
        assert!(report.contains("4. 25/01/2024"));
        assert!(report.contains("| Ana Souza | 1 | 4 | 25% |"));
        assert!(report.contains("| 1 | 1 | 100.0% |"));
        assert!(report.contains("| 3 | — | — |"));
        assert!(report.contains("- Ana Souza (ana@escola.example): 25%"));
    }

    #[test]
    fn report_renders_unscheduled_class() {
        let weekly = WeeklyRecords::new();
        let summary = summarize_class(&class(None), &roster(), &weekly, 75, None);
        let report = build_report(&summary, 75);

        assert!(report.contains("- Término: Data não definida"));
        assert!(report.contains("Nenhuma aula no período definido."));
        assert!(report.contains("Nenhuma semana registrada."));
        assert!(report.contains("Nenhum aluno abaixo do mínimo."));
    }
}
