//! Canned AI answers for demo-like sessions.

/// Local answer for an AI `feature`. Unknown features answer like `chat`.
#[must_use]
pub fn canned_response(feature: &str, query: &str) -> String {
    match feature {
        "predict" => "[DEMO MODE] Based on simulated telemetry, the student is projected to \
                      maintain a stable academic trajectory with a 15% improvement potential \
                      in mathematics over the next quarter."
            .to_string(),
        "report" => "[DEMO MODE] Weekly Pulse Report (Simulated):\n\
                     - Attendance: Stable at 92%\n\
                     - Participation: High in Science, Moderate in Math\n\
                     - Behavioral Trends: Improved focus during afternoon sessions.\n\
                     Note: This is an artificial summary for demonstration purposes."
            .to_string(),
        "tutor" => "[DEMO MODE] Hello! I'm your AI Tutor. Since this is a demo, here is a sample \
                    explanation: photosynthesis is the process by which plants use sunlight to \
                    synthesize nutrients from carbon dioxide and water. The full version solves \
                    complex problems and builds personalized learning paths."
            .to_string(),
        _ => format!(
            "[DEMO MODE] I am operating in a simulated environment. In a live system I would \
             analyze your school's data to answer \"{query}\", looking for correlations in \
             attendance and test scores."
        ),
    }
}
