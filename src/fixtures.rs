use crate::formats::Course;

pub(crate) const COURSE_JSON: &str = include_str!("../tests/fixtures/course.json");

pub(crate) fn sample_course() -> Course {
    serde_json::from_str(COURSE_JSON).expect("parse course fixture")
}

/// Part 1 holds chapter 1 (three takeaways) and chapter 2 (no sections, no takeaways).
pub(crate) fn minimal_course() -> Course {
    serde_json::from_str(
        r##"{
            "courseTitle": "Minimal",
            "parts": [{"part": 1, "title": "Only Part", "color": "#16a085", "chapters": [1, 2]}],
            "chapters": [
                {"chapter": 1, "title": "First", "keyTakeaways": ["a", "b", "c"], "sections": []},
                {"chapter": 2, "title": "Second", "keyTakeaways": [], "sections": []}
            ]
        }"##,
    )
    .expect("parse minimal course fixture")
}
