
use serde_json::json;
use test_support::{
    approx, error_code, request_err, request_ok, seed_sample_school, spawn_sidecar, temp_dir,
};

#[test]
fn student_report_composes_tryouts_ranking_analysis_and_thresholds() {
    let workspace = temp_dir("tryout-student-report");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed_sample_school(&mut stdin, &mut reader, &workspace);

    let report = request_ok(
        &mut stdin,
        &mut reader,
        "report",
        "student.results",
        json!({ "nisn": "0002" }),
    );

    let student = report.get("student").expect("student");
    assert_eq!(student.get("name").and_then(|v| v.as_str()), Some("Budi"));
    assert_eq!(
        student.get("classroom").and_then(|v| v.as_str()),
        Some("9A")
    );

    // Two tryouts in date order; per-tryout averages over Budi's own scores.
    let tryouts = report
        .get("tryouts")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(tryouts.len(), 2);
    assert!(approx(
        tryouts[0].get("average").and_then(|v| v.as_f64()).unwrap_or(0.0),
        67.5
    ));
    let first_scores = tryouts[0]
        .get("scores")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let codes: Vec<&str> = first_scores
        .iter()
        .filter_map(|s| s.get("subjectCode").and_then(|v| v.as_str()))
        .collect();
    assert_eq!(codes, vec!["IPA", "MAT"]);
    assert!(approx(
        tryouts[1].get("average").and_then(|v| v.as_f64()).unwrap_or(0.0),
        72.0
    ));

    // Mean of 67.5 and 72, not of the three raw scores.
    assert!(approx(
        report
            .get("overallAverage")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        69.75
    ));

    // 9A: Ana 77.5, Budi 69.75. School adds Citra at 81.25.
    let ranking = report.get("ranking").expect("ranking");
    assert_eq!(ranking.get("classRank").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        ranking.get("classTotalStudents").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(ranking.get("overallRank").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        ranking.get("overallTotalStudents").and_then(|v| v.as_u64()),
        Some(3)
    );

    let comparison = report.get("classComparison").expect("classComparison");
    let student_avgs: Vec<f64> = comparison
        .get("studentAverages")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_f64()).collect())
        .unwrap_or_default();
    let class_avgs: Vec<f64> = comparison
        .get("classAverages")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_f64()).collect())
        .unwrap_or_default();
    assert_eq!(student_avgs.len(), 2);
    assert!(approx(student_avgs[0], 67.5) && approx(student_avgs[1], 72.0));
    // 9A raw scores per tryout: (80+60+70+70+65)/5 then (85+72)/2.
    assert!(approx(class_avgs[0], 69.0) && approx(class_avgs[1], 78.5));

    // Step trend per subject: MAT 70 -> 72 is +2 (stable), IPA has one score.
    let analysis = report.get("subjectAnalysis").expect("subjectAnalysis");
    let all = analysis
        .get("all")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].get("code").and_then(|v| v.as_str()), Some("MAT"));
    assert!(approx(
        all[0].get("average").and_then(|v| v.as_f64()).unwrap_or(0.0),
        71.0
    ));
    assert!(approx(
        all[0].get("trend").and_then(|v| v.as_f64()).unwrap_or(0.0),
        2.0
    ));
    assert_eq!(
        all[0].get("trendLabel").and_then(|v| v.as_str()),
        Some("stable")
    );
    assert_eq!(
        analysis
            .get("strongest")
            .and_then(|s| s.get("code"))
            .and_then(|v| v.as_str()),
        Some("MAT")
    );
    assert_eq!(
        analysis
            .get("weakest")
            .and_then(|s| s.get("code"))
            .and_then(|v| v.as_str()),
        Some("IPA")
    );

    // Threshold rows use the latest score; ENG has no threshold and is absent.
    let kkm = report
        .get("kkmComparison")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(kkm.len(), 2);
    let ipa = &kkm[0];
    assert_eq!(ipa.get("code").and_then(|v| v.as_str()), Some("IPA"));
    assert!(approx(
        ipa.get("currentValue").and_then(|v| v.as_f64()).unwrap_or(0.0),
        65.0
    ));
    assert_eq!(ipa.get("passed").and_then(|v| v.as_bool()), Some(false));
    assert!(approx(
        ipa.get("gap").and_then(|v| v.as_f64()).unwrap_or(0.0),
        -5.0
    ));
    assert_eq!(ipa.get("status").and_then(|v| v.as_str()), Some("near"));
    let mat = &kkm[1];
    assert_eq!(mat.get("code").and_then(|v| v.as_str()), Some("MAT"));
    assert!(approx(
        mat.get("currentValue").and_then(|v| v.as_f64()).unwrap_or(0.0),
        72.0
    ));
    assert!(approx(
        mat.get("gap").and_then(|v| v.as_f64()).unwrap_or(0.0),
        -3.0
    ));
    assert_eq!(mat.get("status").and_then(|v| v.as_str()), Some("near"));
}

#[test]
fn report_for_unknown_nisn_fails_loudly() {
    let workspace = temp_dir("tryout-student-report-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed_sample_school(&mut stdin, &mut reader, &workspace);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "missing",
        "student.results",
        json!({ "nisn": "4242" }),
    );
    assert_eq!(error_code(&error), "not_found");
}

#[test]
fn scoreless_student_still_gets_a_defined_report() {
    let workspace = temp_dir("tryout-student-report-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seed_sample_school(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "new",
        "students.create",
        json!({ "nisn": "0004", "name": "Dewi", "classroom": "9B" }),
    );
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "report",
        "student.results",
        json!({ "nisn": "0004" }),
    );

    assert!(approx(
        report
            .get("overallAverage")
            .and_then(|v| v.as_f64())
            .unwrap_or(-1.0),
        0.0
    ));
    assert!(report
        .get("tryouts")
        .and_then(|v| v.as_array())
        .map(|a| a.is_empty())
        .unwrap_or(false));
    assert!(report
        .get("kkmComparison")
        .and_then(|v| v.as_array())
        .map(|a| a.is_empty())
        .unwrap_or(false));
    // Dewi averages 0 and lands below her 9B classmate.
    let ranking = report.get("ranking").expect("ranking");
    assert_eq!(ranking.get("classRank").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        ranking.get("classTotalStudents").and_then(|v| v.as_u64()),
        Some(2)
    );
    assert_eq!(ranking.get("overallRank").and_then(|v| v.as_u64()), Some(4));
}
