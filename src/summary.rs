//! Builders for the fixed response shapes consumed by the admin dashboard and
//! the student views. Pure composition over a storage snapshot; every call
//! recomputes from scratch.
//!
//! The average definitions deliberately differ between views: the dashboard
//! overview averages raw scores ("how did every score perform"), student
//! rankings average per-tryout averages ("how did every student perform"),
//! and classroom comparison divides a classroom's raw score total by its raw
//! score count. Each view keeps its own denominator.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::analytics::{
    aggregate, compare_threshold, mean, rank, round2, threshold_status, trend_label,
    trend_last_step, trend_overall, AnalyticsError, CohortMember,
};
use crate::store::{ScoreRow, Snapshot, StudentRow, SubjectRow, TryoutRow};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewCounts {
    pub total_students: usize,
    pub total_tryouts: usize,
    pub total_subjects: usize,
    pub overall_average: f64,
    pub total_scores: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStat {
    pub code: String,
    pub name: String,
    pub average: f64,
    pub count: usize,
    pub kkm: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub name: String,
    pub date: String,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomHeadcount {
    pub classroom: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BelowKkmSubject {
    pub code: String,
    pub name: String,
    pub count: usize,
    pub kkm: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BelowKkm {
    pub total: usize,
    pub by_subject: Vec<BelowKkmSubject>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub overview: OverviewCounts,
    pub subject_stats: Vec<SubjectStat>,
    pub trend_data: Vec<TrendPoint>,
    pub class_stats: Vec<ClassroomHeadcount>,
    pub below_kkm: BelowKkm,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomSubjectAverage {
    pub code: String,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub nisn: String,
    pub name: String,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassroomSummary {
    pub classroom: String,
    pub student_count: usize,
    pub average: f64,
    pub subject_averages: Vec<ClassroomSubjectAverage>,
    pub top_students: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub nisn: String,
    pub name: String,
    pub classroom: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TryoutScoreEntry {
    pub subject: String,
    pub subject_code: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTryout {
    pub id: String,
    pub name: String,
    pub date: String,
    pub scores: Vec<TryoutScoreEntry>,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingBlock {
    pub class_rank: usize,
    pub class_total_students: usize,
    pub overall_rank: usize,
    pub overall_total_students: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassComparison {
    pub student_averages: Vec<f64>,
    pub class_averages: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalysisEntry {
    pub code: String,
    pub name: String,
    pub average: f64,
    pub trend: f64,
    pub trend_label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalysis {
    pub strongest: Option<SubjectAnalysisEntry>,
    pub weakest: Option<SubjectAnalysisEntry>,
    pub all: Vec<SubjectAnalysisEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KkmComparisonEntry {
    pub code: String,
    pub name: String,
    pub kkm: f64,
    pub current_value: f64,
    pub average: f64,
    pub passed: bool,
    pub gap: f64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
    pub student: StudentInfo,
    pub tryouts: Vec<StudentTryout>,
    pub overall_average: f64,
    pub ranking: RankingBlock,
    pub class_comparison: ClassComparison,
    pub subject_analysis: SubjectAnalysis,
    pub kkm_comparison: Vec<KkmComparisonEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendScoreEntry {
    pub tryout_name: String,
    pub tryout_date: String,
    pub value: f64,
    pub kkm: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTrend {
    pub code: String,
    pub name: String,
    pub scores: Vec<TrendScoreEntry>,
    pub trend: f64,
    pub average: f64,
    pub improving: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendComparison {
    pub student_average: f64,
    pub class_average: f64,
    pub above_class: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectTrendsReport {
    pub student: StudentInfo,
    pub subject_trends: Vec<SubjectTrend>,
    pub comparison: TrendComparison,
}

fn subject_index(snap: &Snapshot) -> HashMap<&str, &SubjectRow> {
    snap.subjects
        .iter()
        .map(|s| (s.id.as_str(), s))
        .collect()
}

fn classroom_index(snap: &Snapshot) -> HashMap<&str, &str> {
    snap.students
        .iter()
        .map(|s| (s.id.as_str(), s.classroom.as_str()))
        .collect()
}

fn find_student<'a>(snap: &'a Snapshot, nisn: &str) -> Result<&'a StudentRow, AnalyticsError> {
    snap.students
        .iter()
        .find(|s| s.nisn == nisn)
        .ok_or_else(|| AnalyticsError::new("not_found", "student not found"))
}

/// Per-tryout averages for one student, in tryout order. The tryout order of
/// the snapshot is chronological, so this doubles as the trend series.
fn tryout_average_series(student_id: &str, tryouts: &[TryoutRow], scores: &[ScoreRow]) -> Vec<f64> {
    let per_tryout = aggregate(
        scores.iter().filter(|s| s.student_id == student_id),
        |s| s.tryout_id.as_str(),
    );
    tryouts
        .iter()
        .filter_map(|t| per_tryout.get(t.id.as_str()))
        .map(|agg| agg.average())
        .collect()
}

/// StudentOverallAverage: mean of the student's per-tryout averages, NOT the
/// mean of raw scores. Tryouts cover different numbers of subjects, so the
/// two differ. A student with no scores averages 0 by convention.
fn student_overall_average(student_id: &str, tryouts: &[TryoutRow], scores: &[ScoreRow]) -> f64 {
    mean(&tryout_average_series(student_id, tryouts, scores))
}

fn cohort_members<'a, I>(students: I, tryouts: &[TryoutRow], scores: &[ScoreRow]) -> Vec<CohortMember>
where
    I: IntoIterator<Item = &'a StudentRow>,
{
    students
        .into_iter()
        .map(|s| CohortMember {
            id: s.id.clone(),
            average: student_overall_average(&s.id, tryouts, scores),
        })
        .collect()
}

pub fn dashboard_summary(snap: &Snapshot) -> DashboardSummary {
    let subjects = subject_index(snap);

    let overall = {
        let values: Vec<f64> = snap.scores.iter().map(|s| s.value).collect();
        mean(&values)
    };

    let by_subject = aggregate(snap.scores.iter(), |s| s.subject_id.as_str());
    let mut subject_stats: Vec<SubjectStat> = snap
        .subjects
        .iter()
        .map(|subject| {
            let agg = by_subject.get(subject.id.as_str()).copied().unwrap_or_default();
            SubjectStat {
                code: subject.code.clone(),
                name: subject.name.clone(),
                average: round2(agg.average()),
                count: agg.count,
                kkm: subject.kkm,
            }
        })
        .collect();
    subject_stats.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));

    // Last five tryouts, presented oldest first for the chart.
    let by_tryout = aggregate(snap.scores.iter(), |s| s.tryout_id.as_str());
    let start = snap.tryouts.len().saturating_sub(5);
    let trend_data: Vec<TrendPoint> = snap.tryouts[start..]
        .iter()
        .map(|t| {
            let agg = by_tryout.get(t.id.as_str()).copied().unwrap_or_default();
            TrendPoint {
                name: t.name.clone(),
                date: t.date.clone(),
                average: round2(agg.average()),
            }
        })
        .collect();

    let mut headcounts: HashMap<&str, usize> = HashMap::new();
    for s in &snap.students {
        *headcounts.entry(s.classroom.as_str()).or_insert(0) += 1;
    }
    let mut class_stats: Vec<ClassroomHeadcount> = headcounts
        .into_iter()
        .map(|(classroom, count)| ClassroomHeadcount {
            classroom: classroom.to_string(),
            count,
        })
        .collect();
    class_stats.sort_by(|a, b| a.classroom.cmp(&b.classroom));

    let mut below_total = 0usize;
    for score in &snap.scores {
        let Some(subject) = subjects.get(score.subject_id.as_str()) else {
            continue;
        };
        if let Some(kkm) = subject.kkm {
            if score.value < kkm {
                below_total += 1;
            }
        }
    }
    let by_subject_below: Vec<BelowKkmSubject> = snap
        .subjects
        .iter()
        .filter_map(|subject| {
            let kkm = subject.kkm?;
            let count = snap
                .scores
                .iter()
                .filter(|s| s.subject_id == subject.id && s.value < kkm)
                .count();
            if count == 0 {
                return None;
            }
            Some(BelowKkmSubject {
                code: subject.code.clone(),
                name: subject.name.clone(),
                count,
                kkm,
            })
        })
        .collect();

    DashboardSummary {
        overview: OverviewCounts {
            total_students: snap.students.len(),
            total_tryouts: snap.tryouts.len(),
            total_subjects: snap.subjects.len(),
            overall_average: round2(overall),
            total_scores: snap.scores.len(),
        },
        subject_stats,
        trend_data,
        class_stats,
        below_kkm: BelowKkm {
            total: below_total,
            by_subject: by_subject_below,
        },
    }
}

pub fn classroom_comparison(snap: &Snapshot) -> Vec<ClassroomSummary> {
    let subjects = subject_index(snap);
    let classrooms = classroom_index(snap);

    // Students per classroom, keeping the snapshot's (classroom, name) order.
    let mut members: HashMap<&str, Vec<&StudentRow>> = HashMap::new();
    for s in &snap.students {
        members.entry(s.classroom.as_str()).or_default().push(s);
    }

    let class_of = |score: &ScoreRow| classrooms.get(score.student_id.as_str()).copied().unwrap_or("");
    let by_class = aggregate(snap.scores.iter(), |s| class_of(s));
    let by_class_subject = aggregate(snap.scores.iter(), |s| {
        (class_of(s), s.subject_id.as_str())
    });
    let by_student = aggregate(snap.scores.iter(), |s| s.student_id.as_str());

    let mut out: Vec<ClassroomSummary> = members
        .into_iter()
        .map(|(classroom, students)| {
            let class_agg = by_class.get(classroom).copied().unwrap_or_default();

            let mut subject_averages: Vec<ClassroomSubjectAverage> = by_class_subject
                .iter()
                .filter(|((c, _), _)| *c == classroom)
                .filter_map(|((_, subject_id), agg)| {
                    let subject = subjects.get(subject_id)?;
                    Some(ClassroomSubjectAverage {
                        code: subject.code.clone(),
                        average: round2(agg.average()),
                    })
                })
                .collect();
            subject_averages.sort_by(|a, b| a.code.cmp(&b.code));

            let mut leaderboard: Vec<LeaderboardEntry> = students
                .iter()
                .map(|s| {
                    let agg = by_student.get(s.id.as_str()).copied().unwrap_or_default();
                    LeaderboardEntry {
                        nisn: s.nisn.clone(),
                        name: s.name.clone(),
                        average: round2(agg.average()),
                    }
                })
                .collect();
            leaderboard.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
            leaderboard.truncate(5);

            ClassroomSummary {
                classroom: classroom.to_string(),
                student_count: students.len(),
                average: round2(class_agg.average()),
                subject_averages,
                top_students: leaderboard,
            }
        })
        .collect();
    out.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    out
}

pub fn student_report(snap: &Snapshot, nisn: &str) -> Result<StudentReport, AnalyticsError> {
    let student = find_student(snap, nisn)?;
    let subjects = subject_index(snap);

    let own_scores: Vec<&ScoreRow> = snap
        .scores
        .iter()
        .filter(|s| s.student_id == student.id)
        .collect();

    // Per-tryout breakdown, chronological; tryouts without a score are absent.
    let mut tryouts: Vec<StudentTryout> = Vec::new();
    for t in &snap.tryouts {
        let mut entries: Vec<TryoutScoreEntry> = own_scores
            .iter()
            .filter(|s| s.tryout_id == t.id)
            .filter_map(|s| {
                let subject = subjects.get(s.subject_id.as_str())?;
                Some(TryoutScoreEntry {
                    subject: subject.name.clone(),
                    subject_code: subject.code.clone(),
                    value: s.value,
                })
            })
            .collect();
        if entries.is_empty() {
            continue;
        }
        entries.sort_by(|a, b| a.subject_code.cmp(&b.subject_code));
        let values: Vec<f64> = entries.iter().map(|e| e.value).collect();
        tryouts.push(StudentTryout {
            id: t.id.clone(),
            name: t.name.clone(),
            date: t.date.clone(),
            average: round2(mean(&values)),
            scores: entries,
        });
    }

    let series = tryout_average_series(&student.id, &snap.tryouts, &snap.scores);
    let overall_average = mean(&series);

    let classmates: Vec<&StudentRow> = snap
        .students
        .iter()
        .filter(|s| s.classroom == student.classroom)
        .collect();
    let class_cohort = cohort_members(classmates.iter().copied(), &snap.tryouts, &snap.scores);
    let class_rank = rank(&class_cohort, &student.id)?;
    let school_cohort = cohort_members(snap.students.iter(), &snap.tryouts, &snap.scores);
    let school_rank = rank(&school_cohort, &student.id)?;

    // Classroom average per tryout the student sat, for the comparison chart.
    let classmate_ids: Vec<&str> = classmates.iter().map(|s| s.id.as_str()).collect();
    let class_averages: Vec<f64> = tryouts
        .iter()
        .map(|t| {
            let values: Vec<f64> = snap
                .scores
                .iter()
                .filter(|s| s.tryout_id == t.id && classmate_ids.contains(&s.student_id.as_str()))
                .map(|s| s.value)
                .collect();
            round2(mean(&values))
        })
        .collect();
    let student_averages: Vec<f64> = tryouts.iter().map(|t| t.average).collect();

    // Per-subject step trend, on the chronological value series.
    let mut analysis: Vec<SubjectAnalysisEntry> = Vec::new();
    for subject in &snap.subjects {
        let values = subject_value_series(&own_scores, &snap.tryouts, &subject.id);
        if values.is_empty() {
            continue;
        }
        let step = trend_last_step(&values);
        analysis.push(SubjectAnalysisEntry {
            code: subject.code.clone(),
            name: subject.name.clone(),
            average: round2(mean(&values)),
            trend: round2(step.delta),
            trend_label: trend_label(step.delta).as_str().to_string(),
        });
    }
    analysis.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    let strongest = analysis.first().cloned();
    let weakest = analysis.last().cloned();

    // Threshold check against the most recent score, not the average.
    // Subjects without a threshold are skipped outright.
    let mut kkm_comparison: Vec<KkmComparisonEntry> = Vec::new();
    for subject in &snap.subjects {
        let Some(kkm) = subject.kkm else {
            continue;
        };
        let values = subject_value_series(&own_scores, &snap.tryouts, &subject.id);
        let Some(current) = values.last().copied() else {
            continue;
        };
        let check = compare_threshold(current, kkm);
        kkm_comparison.push(KkmComparisonEntry {
            code: subject.code.clone(),
            name: subject.name.clone(),
            kkm,
            current_value: current,
            average: round2(mean(&values)),
            passed: check.passed,
            gap: round2(check.gap),
            status: threshold_status(current, kkm).as_str().to_string(),
        });
    }

    Ok(StudentReport {
        student: StudentInfo {
            nisn: student.nisn.clone(),
            name: student.name.clone(),
            classroom: student.classroom.clone(),
        },
        tryouts,
        overall_average: round2(overall_average),
        ranking: RankingBlock {
            class_rank: class_rank.position,
            class_total_students: class_rank.cohort_size,
            overall_rank: school_rank.position,
            overall_total_students: school_rank.cohort_size,
        },
        class_comparison: ClassComparison {
            student_averages,
            class_averages,
        },
        subject_analysis: SubjectAnalysis {
            strongest,
            weakest,
            all: analysis,
        },
        kkm_comparison,
    })
}

pub fn student_subject_trends(
    snap: &Snapshot,
    nisn: &str,
) -> Result<SubjectTrendsReport, AnalyticsError> {
    let student = find_student(snap, nisn)?;

    let own_scores: Vec<&ScoreRow> = snap
        .scores
        .iter()
        .filter(|s| s.student_id == student.id)
        .collect();

    let tryout_by_id: HashMap<&str, &TryoutRow> = snap
        .tryouts
        .iter()
        .map(|t| (t.id.as_str(), t))
        .collect();

    let mut subject_trends: Vec<SubjectTrend> = Vec::new();
    for subject in &snap.subjects {
        let mut entries: Vec<TrendScoreEntry> = Vec::new();
        for t in &snap.tryouts {
            for s in own_scores
                .iter()
                .filter(|s| s.tryout_id == t.id && s.subject_id == subject.id)
            {
                let tryout = tryout_by_id.get(s.tryout_id.as_str()).copied();
                entries.push(TrendScoreEntry {
                    tryout_name: tryout.map(|t| t.name.clone()).unwrap_or_default(),
                    tryout_date: tryout.map(|t| t.date.clone()).unwrap_or_default(),
                    value: s.value,
                    kkm: subject.kkm,
                });
            }
        }
        if entries.is_empty() {
            continue;
        }
        let values: Vec<f64> = entries.iter().map(|e| e.value).collect();
        let whole = trend_overall(&values);
        subject_trends.push(SubjectTrend {
            code: subject.code.clone(),
            name: subject.name.clone(),
            scores: entries,
            trend: round2(whole.delta),
            average: round2(mean(&values)),
            improving: whole.improving,
        });
    }

    // Comparison here is over raw scores: the student's raw mean against the
    // classroom's mean of per-student raw means.
    let own_values: Vec<f64> = own_scores.iter().map(|s| s.value).collect();
    let student_average = mean(&own_values);

    let by_student = aggregate(snap.scores.iter(), |s| s.student_id.as_str());
    let classmate_means: Vec<f64> = snap
        .students
        .iter()
        .filter(|s| s.classroom == student.classroom)
        .map(|s| {
            by_student
                .get(s.id.as_str())
                .map(|agg| agg.average())
                .unwrap_or(0.0)
        })
        .collect();
    let class_average = mean(&classmate_means);

    Ok(SubjectTrendsReport {
        student: StudentInfo {
            nisn: student.nisn.clone(),
            name: student.name.clone(),
            classroom: student.classroom.clone(),
        },
        subject_trends,
        comparison: TrendComparison {
            student_average: round2(student_average),
            class_average: round2(class_average),
            above_class: student_average > class_average,
        },
    })
}

/// Chronological value series for one (student, subject) pair. At most one
/// score exists per (student, tryout, subject) triple.
fn subject_value_series(own_scores: &[&ScoreRow], tryouts: &[TryoutRow], subject_id: &str) -> Vec<f64> {
    let mut values = Vec::new();
    for t in tryouts {
        for s in own_scores
            .iter()
            .filter(|s| s.tryout_id == t.id && s.subject_id == subject_id)
        {
            values.push(s.value);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ScoreRow, Snapshot, StudentRow, SubjectRow, TryoutRow};

    fn student(id: &str, nisn: &str, name: &str, classroom: &str) -> StudentRow {
        StudentRow {
            id: id.to_string(),
            nisn: nisn.to_string(),
            name: name.to_string(),
            classroom: classroom.to_string(),
        }
    }

    fn subject(id: &str, code: &str, kkm: Option<f64>) -> SubjectRow {
        SubjectRow {
            id: id.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            kkm,
        }
    }

    fn tryout(id: &str, date: &str) -> TryoutRow {
        TryoutRow {
            id: id.to_string(),
            name: format!("Tryout {}", id),
            date: date.to_string(),
        }
    }

    fn score(student_id: &str, tryout_id: &str, subject_id: &str, value: f64) -> ScoreRow {
        ScoreRow {
            student_id: student_id.to_string(),
            tryout_id: tryout_id.to_string(),
            subject_id: subject_id.to_string(),
            value,
        }
    }

    /// One student scored a single-subject tryout at 100, the other a
    /// two-subject tryout at 40 each. Raw mean is 60, mean of per-student
    /// overall averages is 70; the two views must not agree.
    #[test]
    fn overview_average_uses_raw_scores_not_average_of_averages() {
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A"), student("s2", "0002", "Budi", "9A")],
            subjects: vec![subject("m1", "MAT", None), subject("m2", "IPA", None)],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores: vec![
                score("s1", "t1", "m1", 100.0),
                score("s2", "t1", "m1", 40.0),
                score("s2", "t1", "m2", 40.0),
            ],
        };

        let dashboard = dashboard_summary(&snap);
        assert!((dashboard.overview.overall_average - 60.0).abs() < 1e-9);

        let a = student_report(&snap, "0001").expect("report");
        let b = student_report(&snap, "0002").expect("report");
        assert!((a.overall_average - 100.0).abs() < 1e-9);
        assert!((b.overall_average - 40.0).abs() < 1e-9);
        let per_student = (a.overall_average + b.overall_average) / 2.0;
        assert!((per_student - dashboard.overview.overall_average).abs() >= 1.0);
    }

    #[test]
    fn dashboard_lists_scoreless_subjects_at_zero() {
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A")],
            subjects: vec![subject("m1", "MAT", None), subject("m2", "IPA", None)],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores: vec![score("s1", "t1", "m1", 80.0)],
        };
        let dashboard = dashboard_summary(&snap);
        let ipa = dashboard
            .subject_stats
            .iter()
            .find(|s| s.code == "IPA")
            .expect("IPA listed");
        assert_eq!(ipa.count, 0);
        assert_eq!(ipa.average, 0.0);
    }

    #[test]
    fn dashboard_trend_window_is_last_five_oldest_first() {
        let tryouts: Vec<TryoutRow> = (1..=7)
            .map(|i| tryout(&format!("t{}", i), &format!("2024-01-{:02}", i)))
            .collect();
        let scores: Vec<ScoreRow> = (1..=7)
            .map(|i| score("s1", &format!("t{}", i), "m1", 10.0 * i as f64))
            .collect();
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A")],
            subjects: vec![subject("m1", "MAT", None)],
            tryouts,
            scores,
        };
        let dashboard = dashboard_summary(&snap);
        assert_eq!(dashboard.trend_data.len(), 5);
        assert_eq!(dashboard.trend_data[0].date, "2024-01-03");
        assert_eq!(dashboard.trend_data[4].date, "2024-01-07");
        assert!((dashboard.trend_data[0].average - 30.0).abs() < 1e-9);
    }

    #[test]
    fn below_kkm_counts_skip_subjects_without_threshold() {
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A"), student("s2", "0002", "Budi", "9A")],
            subjects: vec![subject("m1", "MAT", Some(75.0)), subject("m2", "IPA", None)],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores: vec![
                score("s1", "t1", "m1", 70.0),
                score("s2", "t1", "m1", 80.0),
                score("s1", "t1", "m2", 10.0),
            ],
        };
        let dashboard = dashboard_summary(&snap);
        assert_eq!(dashboard.below_kkm.total, 1);
        assert_eq!(dashboard.below_kkm.by_subject.len(), 1);
        assert_eq!(dashboard.below_kkm.by_subject[0].code, "MAT");
        assert_eq!(dashboard.below_kkm.by_subject[0].count, 1);
    }

    #[test]
    fn classroom_average_divides_by_raw_score_count() {
        // 9A holds scores 100, 40, 40 -> 60 exactly, regardless of how the
        // scores distribute over students.
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A"), student("s2", "0002", "Budi", "9A")],
            subjects: vec![subject("m1", "MAT", None), subject("m2", "IPA", None)],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores: vec![
                score("s1", "t1", "m1", 100.0),
                score("s2", "t1", "m1", 40.0),
                score("s2", "t1", "m2", 40.0),
            ],
        };
        let classes = classroom_comparison(&snap);
        assert_eq!(classes.len(), 1);
        assert!((classes[0].average - 60.0).abs() < 1e-9);
        assert_eq!(classes[0].student_count, 2);
    }

    #[test]
    fn classroom_leaderboard_caps_at_five() {
        let students: Vec<StudentRow> = (0..7)
            .map(|i| student(&format!("s{}", i), &format!("{:04}", i), &format!("S{}", i), "9A"))
            .collect();
        let scores: Vec<ScoreRow> = (0..7)
            .map(|i| score(&format!("s{}", i), "t1", "m1", 50.0 + i as f64))
            .collect();
        let snap = Snapshot {
            students,
            subjects: vec![subject("m1", "MAT", None)],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores,
        };
        let classes = classroom_comparison(&snap);
        assert_eq!(classes[0].top_students.len(), 5);
        assert_eq!(classes[0].top_students[0].nisn, "0006");
        assert!((classes[0].top_students[0].average - 56.0).abs() < 1e-9);
    }

    #[test]
    fn student_report_ranks_both_cohorts() {
        // 9A: 90 / 80 / 70. 9B: 95. The 80-average student is 2 of 3 in the
        // classroom and 3 of 4 school-wide.
        let snap = Snapshot {
            students: vec![
                student("s1", "0001", "Ana", "9A"),
                student("s2", "0002", "Budi", "9A"),
                student("s3", "0003", "Citra", "9A"),
                student("s4", "0004", "Dewi", "9B"),
            ],
            subjects: vec![subject("m1", "MAT", None)],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores: vec![
                score("s1", "t1", "m1", 90.0),
                score("s2", "t1", "m1", 80.0),
                score("s3", "t1", "m1", 70.0),
                score("s4", "t1", "m1", 95.0),
            ],
        };
        let report = student_report(&snap, "0002").expect("report");
        assert_eq!(report.ranking.class_rank, 2);
        assert_eq!(report.ranking.class_total_students, 3);
        assert_eq!(report.ranking.overall_rank, 3);
        assert_eq!(report.ranking.overall_total_students, 4);
    }

    #[test]
    fn student_report_kkm_uses_latest_score_and_skips_missing_thresholds() {
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A")],
            subjects: vec![subject("m1", "MAT", Some(75.0)), subject("m2", "IPA", None)],
            tryouts: vec![tryout("t1", "2024-01-10"), tryout("t2", "2024-02-10")],
            scores: vec![
                score("s1", "t1", "m1", 90.0),
                score("s1", "t2", "m1", 74.9),
                score("s1", "t1", "m2", 30.0),
            ],
        };
        let report = student_report(&snap, "0001").expect("report");
        assert_eq!(report.kkm_comparison.len(), 1);
        let mat = &report.kkm_comparison[0];
        assert_eq!(mat.code, "MAT");
        assert!((mat.current_value - 74.9).abs() < 1e-9);
        assert!(!mat.passed);
        assert!((mat.gap - -0.1).abs() < 1e-9);
        assert_eq!(mat.status, "near");
    }

    #[test]
    fn student_report_for_scoreless_student_is_defined() {
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A")],
            subjects: vec![subject("m1", "MAT", Some(75.0))],
            tryouts: vec![tryout("t1", "2024-01-10")],
            scores: vec![],
        };
        let report = student_report(&snap, "0001").expect("report");
        assert_eq!(report.overall_average, 0.0);
        assert!(report.tryouts.is_empty());
        assert!(report.subject_analysis.all.is_empty());
        assert!(report.subject_analysis.strongest.is_none());
        assert_eq!(report.ranking.class_rank, 1);
        assert_eq!(report.ranking.class_total_students, 1);
    }

    #[test]
    fn subject_trends_span_whole_series() {
        let snap = Snapshot {
            students: vec![student("s1", "0001", "Ana", "9A")],
            subjects: vec![subject("m1", "MAT", Some(75.0))],
            tryouts: vec![
                tryout("t1", "2024-01-10"),
                tryout("t2", "2024-02-10"),
                tryout("t3", "2024-03-10"),
            ],
            scores: vec![
                score("s1", "t1", "m1", 60.0),
                score("s1", "t2", "m1", 90.0),
                score("s1", "t3", "m1", 72.0),
            ],
        };
        let trends = student_subject_trends(&snap, "0001").expect("trends");
        assert_eq!(trends.subject_trends.len(), 1);
        let mat = &trends.subject_trends[0];
        assert!((mat.trend - 12.0).abs() < 1e-9);
        assert!(mat.improving);
        assert_eq!(mat.scores.len(), 3);
        assert_eq!(mat.scores[0].tryout_date, "2024-01-10");
        assert!((mat.average - 74.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_student_is_not_found() {
        let snap = Snapshot {
            students: vec![],
            subjects: vec![],
            tryouts: vec![],
            scores: vec![],
        };
        let e = student_report(&snap, "9999").expect_err("must fail");
        assert_eq!(e.code, "not_found");
        let e = student_subject_trends(&snap, "9999").expect_err("must fail");
        assert_eq!(e.code, "not_found");
    }
}
